use anyhow::{bail, Result};
use chatbot_core::models::{LoginCredentials, ProfileUpdate, SignupData};
use chatbot_core::{AppContext, Config, User};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use tracing::warn;

use crate::explain;

pub async fn login(context: &AppContext, username: Option<String>) -> Result<()> {
    let theme = ColorfulTheme::default();
    let username = match username {
        Some(username) => username,
        None => {
            let mut prompt = Input::<String>::with_theme(&theme).with_prompt("Username");
            if let Some(last) = &context.config().last_username {
                prompt = prompt.default(last.clone());
            }
            prompt.interact_text()?
        }
    };
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;

    let credentials = LoginCredentials {
        username: username.trim().to_string(),
        password,
    };
    let user = context
        .auth()
        .login(&credentials)
        .await
        .map_err(|e| explain(e, "Login failed"))?;

    if let Err(err) = Config::save_last_username(&user.username) {
        warn!(error = %err, "Failed to save last username");
    }

    println!("{} {}", "Logged in as".green(), user.display_name().bold());
    Ok(())
}

pub async fn logout(context: &AppContext) -> Result<()> {
    context
        .auth()
        .logout()
        .await
        .map_err(|e| explain(e, "Logout failed"))?;
    println!("{}", "Logged out".green());
    Ok(())
}

pub async fn signup(context: &AppContext) -> Result<()> {
    let theme = ColorfulTheme::default();
    let text = |prompt: &str| -> Result<String> {
        Ok(Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?)
    };

    let username = text("Username")?;
    let email = text("Email")?;
    let first_name = text("First name")?;
    let last_name = text("Last name")?;
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;
    let password2 = Password::with_theme(&theme)
        .with_prompt("Confirm password")
        .interact()?;

    let data = SignupData {
        username: username.trim().to_string(),
        email: email.trim().to_string(),
        password,
        password2,
        first_name: first_name.trim().to_string(),
        last_name: last_name.trim().to_string(),
    };
    let user = context
        .auth()
        .signup(&data)
        .await
        .map_err(|e| explain(e, "Signup failed"))?;

    println!(
        "{} {}",
        "Account created. Logged in as".green(),
        user.username.bold()
    );
    Ok(())
}

fn print_user(user: &User) {
    println!("{}", user.display_name().bold());
    println!("  {:<10} {}", "username".dimmed(), user.username);
    println!("  {:<10} {}", "email".dimmed(), user.email);
    println!("  {:<10} {}", "role".dimmed(), role_label(user));
    println!(
        "  {:<10} {}",
        "joined".dimmed(),
        user.date_joined.format("%Y-%m-%d")
    );
}

fn role_label(user: &User) -> ColoredString {
    if user.is_admin() {
        user.role.as_str().magenta().bold()
    } else {
        user.role.as_str().normal()
    }
}

pub fn whoami(context: &AppContext) -> Result<()> {
    match context.auth().user() {
        Some(user) => print_user(&user),
        None => bail!("Not logged in"),
    }
    Ok(())
}

pub async fn profile(
    context: &AppContext,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> Result<()> {
    let update = ProfileUpdate {
        email,
        first_name,
        last_name,
    };
    if update.is_empty() {
        return whoami(context);
    }

    let user = context
        .auth()
        .update_profile(&update)
        .await
        .map_err(|e| explain(e, "Failed to update profile"))?;
    println!("{}", "Profile updated".green());
    print_user(&user);
    Ok(())
}

pub async fn users(context: &AppContext) -> Result<()> {
    if !context.auth().is_admin() {
        bail!("You do not have permission to perform this action.");
    }

    let users = context
        .auth()
        .list_users()
        .await
        .map_err(|e| explain(e, "Failed to fetch users"))?;

    println!("\n{} users:\n", users.len().to_string().bold().green());
    for user in &users {
        println!(
            "{:>5}  {:<20} {:<30} {}",
            user.id.to_string().dimmed(),
            user.username.bold(),
            user.email,
            role_label(user)
        );
    }
    Ok(())
}
