//! Single-line text inputs and the multi-field forms built from them.

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextInput {
    pub value: String,
    pub cursor: usize, // cursor position in chars
}

impl TextInput {
    pub fn with_value(value: &str) -> Self {
        Self {
            value: value.to_string(),
            cursor: value.chars().count(),
        }
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.value, self.cursor);
        self.value.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.value.chars().count() {
            let byte_pos = char_to_byte_index(&self.value, self.cursor);
            self.value.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.value.chars().count();
    }

    /// Take the value out, leaving the input empty.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.value)
    }

    pub fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }

    /// The slice of the value that fits in `width` columns with the cursor
    /// visible, plus the cursor's column inside that slice.
    pub fn visible(&self, width: usize) -> (String, usize) {
        let scroll_offset = if width == 0 {
            0
        } else if self.cursor >= width {
            self.cursor - width + 1
        } else {
            0
        };
        let text = self.value.chars().skip(scroll_offset).take(width).collect();
        (text, self.cursor - scroll_offset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: &'static str,
    pub label: &'static str,
    pub input: TextInput,
    /// Rendered as asterisks.
    pub secret: bool,
}

impl Field {
    pub fn new(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            input: TextInput::default(),
            secret: false,
        }
    }

    pub fn secret(key: &'static str, label: &'static str) -> Self {
        Self {
            secret: true,
            ..Self::new(key, label)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub fields: Vec<Field>,
    pub focused: usize,
}

impl Form {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields, focused: 0 }
    }

    pub fn login() -> Self {
        Self::new(vec![
            Field::new("username", "Username"),
            Field::secret("password", "Password"),
        ])
    }

    pub fn signup() -> Self {
        Self::new(vec![
            Field::new("username", "Username"),
            Field::new("email", "Email"),
            Field::new("first_name", "First name"),
            Field::new("last_name", "Last name"),
            Field::secret("password", "Password"),
            Field::secret("password2", "Confirm password"),
        ])
    }

    pub fn account() -> Self {
        Self::new(vec![
            Field::new("email", "Email"),
            Field::new("first_name", "First name"),
            Field::new("last_name", "Last name"),
        ])
    }

    pub fn datasource() -> Self {
        Self::new(vec![
            Field::new("title", "Title"),
            Field::new("description", "Description"),
            Field::new("file", "File path"),
        ])
    }

    pub fn datasource_edit() -> Self {
        Self::new(vec![
            Field::new("title", "Title"),
            Field::new("description", "Description"),
        ])
    }

    pub fn value(&self, key: &str) -> &str {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.input.value.as_str())
            .unwrap_or("")
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(field) = self.fields.iter_mut().find(|f| f.key == key) {
            field.input = TextInput::with_value(value);
        }
    }

    pub fn focused_key(&self) -> &'static str {
        self.fields.get(self.focused).map(|f| f.key).unwrap_or("")
    }

    pub fn input(&mut self) -> Option<&mut TextInput> {
        self.fields.get_mut(self.focused).map(|f| &mut f.input)
    }

    pub fn next(&mut self) {
        if !self.fields.is_empty() {
            self.focused = (self.focused + 1) % self.fields.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.fields.is_empty() {
            self.focused = (self.focused + self.fields.len() - 1) % self.fields.len();
        }
    }

    /// Move focus to the field named `key`, if present.
    pub fn focus(&mut self, key: &str) {
        if let Some(i) = self.fields.iter().position(|f| f.key == key) {
            self.focused = i;
        }
    }

    pub fn clear_secrets(&mut self) {
        for field in self.fields.iter_mut().filter(|f| f.secret) {
            field.input.clear();
        }
    }

    pub fn reset(&mut self) {
        for field in &mut self.fields {
            field.input.clear();
        }
        self.focused = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editing_multibyte_text() {
        let mut input = TextInput::default();
        for c in "olá!".chars() {
            input.insert(c);
        }
        input.left();
        input.backspace();
        assert_eq!(input.value, "ol!");
        assert_eq!(input.cursor, 2);

        input.home();
        input.delete();
        assert_eq!(input.value, "l!");
    }

    #[test]
    fn test_visible_window_follows_cursor() {
        let input = TextInput::with_value("abcdefghij");
        let (text, cursor) = input.visible(4);
        assert_eq!(text, "hij");
        assert_eq!(cursor, 3);

        let (text, cursor) = TextInput::with_value("ab").visible(4);
        assert_eq!((text.as_str(), cursor), ("ab", 2));
    }

    #[test]
    fn test_form_focus_wraps() {
        let mut form = Form::login();
        assert_eq!(form.focused_key(), "username");
        form.next();
        form.next();
        assert_eq!(form.focused_key(), "username");
        form.prev();
        assert_eq!(form.focused_key(), "password");
    }

    #[test]
    fn test_clear_secrets_keeps_username() {
        let mut form = Form::login();
        form.set("username", "ana");
        form.set("password", "pw");
        form.clear_secrets();
        assert_eq!(form.value("username"), "ana");
        assert_eq!(form.value("password"), "");
    }
}
