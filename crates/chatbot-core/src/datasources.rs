//! Admin datasource management: listing, upload validation, CRUD, processing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::Backend;
use crate::error::{ApiError, ValidationError, MAX_UPLOAD_BYTES};
use crate::models::{
    DataSource, DataSourceId, DataSourceUpdate, DataSourceUpload, ProcessConfig, ProcessOutcome,
    SourceType,
};

/// The create form as the user filled it in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDataSource {
    pub title: String,
    pub source_type: Option<SourceType>,
    pub description: String,
    pub file: Option<PathBuf>,
}

/// MIME type inferred from the file name, or an empty string when unknown.
pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_default()
}

/// Check a chosen file against the accepted types, the size cap, and the
/// chosen source type, in that order.
pub fn check_file(chosen: SourceType, mime: &str, size: u64) -> Result<(), ValidationError> {
    let detected = SourceType::from_mime(mime).ok_or_else(|| ValidationError::UnsupportedFile {
        mime: mime.to_string(),
    })?;
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::FileTooLarge { size });
    }
    if detected != chosen {
        return Err(ValidationError::TypeMismatch { chosen, detected });
    }
    Ok(())
}

/// Validate the form and read the file. Nothing is read before every check
/// that can be made from the name and metadata has passed.
pub async fn prepare_upload(form: &NewDataSource) -> Result<DataSourceUpload, ApiError> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(ValidationError::Required { field: "title" }.into());
    }
    let source_type = form.source_type.ok_or(ValidationError::SourceTypeMissing)?;
    let path = form.file.as_deref().ok_or(ValidationError::FileMissing)?;

    let mime = guess_mime(path);
    if SourceType::from_mime(&mime).is_none() {
        return Err(ValidationError::UnsupportedFile { mime }.into());
    }
    let size = tokio::fs::metadata(path).await?.len();
    check_file(source_type, &mime, size)?;

    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("upload.{}", source_type.as_str()));
    let description = form.description.trim();

    debug!(file = %file_name, size, "Prepared upload");
    Ok(DataSourceUpload {
        title: title.to_string(),
        source_type,
        description: (!description.is_empty()).then(|| description.to_string()),
        file_name,
        mime,
        bytes,
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSourceState {
    pub items: Vec<DataSource>,
    /// Record loaded by the last `get`.
    pub current: Option<DataSource>,
    pub loading: bool,
    /// A create, update, delete, or process request is in flight.
    pub busy: bool,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct DataSourceManager {
    backend: Arc<dyn Backend>,
    state: Arc<Mutex<DataSourceState>>,
}

impl DataSourceManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(DataSourceState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DataSourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DataSourceState {
        self.lock().clone()
    }

    pub fn items(&self) -> Vec<DataSource> {
        self.lock().items.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().error = None;
    }

    fn cached(&self, id: DataSourceId) -> Option<DataSource> {
        let state = self.lock();
        state
            .items
            .iter()
            .chain(state.current.iter())
            .find(|d| d.id == id)
            .cloned()
    }

    fn begin(&self) {
        let mut state = self.lock();
        state.busy = true;
        state.error = None;
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        let message = err.user_message(fallback);
        if !matches!(err, ApiError::Validation(_)) {
            warn!(error = %err, "{}", fallback);
        }
        let mut state = self.lock();
        state.error = Some(message);
        state.loading = false;
        state.busy = false;
        err
    }

    /// Store `updated` wherever the record is cached.
    fn replace(state: &mut DataSourceState, updated: &DataSource) {
        if let Some(slot) = state.items.iter_mut().find(|d| d.id == updated.id) {
            *slot = updated.clone();
        }
        if let Some(current) = state.current.as_mut().filter(|d| d.id == updated.id) {
            *current = updated.clone();
        }
    }

    /// Refetch the full list.
    pub async fn list(&self) -> Result<Vec<DataSource>, ApiError> {
        {
            let mut state = self.lock();
            state.loading = true;
            state.error = None;
        }

        match self.backend.list_datasources().await {
            Ok(items) => {
                let mut state = self.lock();
                state.items = items.clone();
                state.loading = false;
                Ok(items)
            }
            Err(err) => Err(self.fail(err, "Failed to fetch datasources")),
        }
    }

    pub async fn get(&self, id: DataSourceId) -> Result<DataSource, ApiError> {
        self.lock().loading = true;

        match self.backend.get_datasource(id).await {
            Ok(datasource) => {
                let mut state = self.lock();
                Self::replace(&mut state, &datasource);
                state.current = Some(datasource.clone());
                state.loading = false;
                Ok(datasource)
            }
            Err(err) => Err(self.fail(err, "Failed to fetch datasource")),
        }
    }

    /// Validate the form, upload the file, and prepend the new record.
    pub async fn create(&self, form: &NewDataSource) -> Result<DataSource, ApiError> {
        let upload = match prepare_upload(form).await {
            Ok(upload) => upload,
            Err(err) => return Err(self.fail(err, "Failed to create datasource")),
        };

        self.begin();
        match self.backend.create_datasource(&upload).await {
            Ok(datasource) => {
                info!(id = %datasource.id, title = %datasource.title, "Created datasource");
                let mut state = self.lock();
                state.items.insert(0, datasource.clone());
                state.busy = false;
                Ok(datasource)
            }
            Err(err) => Err(self.fail(err, "Failed to create datasource")),
        }
    }

    pub async fn update(
        &self,
        id: DataSourceId,
        update: &DataSourceUpdate,
    ) -> Result<DataSource, ApiError> {
        if let Some(title) = &update.title {
            if title.trim().is_empty() {
                let err = ValidationError::Required { field: "title" };
                return Err(self.fail(err.into(), "Failed to update datasource"));
            }
        }

        self.begin();
        match self.backend.update_datasource(id, update).await {
            Ok(updated) => {
                info!(id = %id, "Updated datasource");
                let mut state = self.lock();
                Self::replace(&mut state, &updated);
                state.busy = false;
                Ok(updated)
            }
            Err(err) => Err(self.fail(err, "Failed to update datasource")),
        }
    }

    pub async fn delete(&self, id: DataSourceId) -> Result<(), ApiError> {
        self.begin();
        match self.backend.delete_datasource(id).await {
            Ok(()) => {
                info!(id = %id, "Deleted datasource");
                let mut state = self.lock();
                state.items.retain(|d| d.id != id);
                if state.current.as_ref().is_some_and(|d| d.id == id) {
                    state.current = None;
                }
                state.busy = false;
                Ok(())
            }
            Err(err) => Err(self.fail(err, "Failed to delete datasource")),
        }
    }

    /// Ask the backend to (re)process a datasource.
    ///
    /// Refused locally when the cached status is neither unprocessed nor
    /// failed. The status in the response is recorded; later transitions
    /// show up only after `list` or `get`.
    pub async fn process(
        &self,
        id: DataSourceId,
        config: Option<&ProcessConfig>,
    ) -> Result<ProcessOutcome, ApiError> {
        if let Some(cached) = self.cached(id) {
            let status = cached.processing_status;
            if !status.is_processable() {
                let err = ValidationError::NotProcessable { status };
                return Err(self.fail(err.into(), "Failed to process datasource"));
            }
        }

        self.begin();
        match self.backend.process_datasource(id, config).await {
            Ok(outcome) => {
                info!(id = %id, status = %outcome.status, "Processing requested");
                let mut guard = self.lock();
                let state = &mut *guard;
                for datasource in state.items.iter_mut().chain(state.current.iter_mut()) {
                    if datasource.id == id {
                        datasource.processing_status = outcome.status;
                    }
                }
                state.busy = false;
                Ok(outcome)
            }
            Err(err) => Err(self.fail(err, "Failed to process datasource")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessingStatus, UserRole};
    use crate::testing::{datasource, user, Endpoint, FakeBackend};
    use std::fs::File;
    use std::io::Write;

    fn admin_backend() -> FakeBackend {
        FakeBackend::new().signed_in(user(1, "root", UserRole::Admin))
    }

    fn setup(fake: FakeBackend) -> (Arc<FakeBackend>, DataSourceManager) {
        let fake = Arc::new(fake);
        let manager = DataSourceManager::new(fake.clone());
        (fake, manager)
    }

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    fn form(title: &str, source_type: Option<SourceType>, file: Option<PathBuf>) -> NewDataSource {
        NewDataSource {
            title: title.to_string(),
            source_type,
            description: String::new(),
            file,
        }
    }

    #[test]
    fn test_guess_mime_for_accepted_extensions() {
        assert_eq!(guess_mime(Path::new("a.pdf")), "application/pdf");
        assert_eq!(guess_mime(Path::new("a.doc")), "application/msword");
        assert_eq!(guess_mime(Path::new("a.txt")), "text/plain");
        assert_eq!(guess_mime(Path::new("noextension")), "");
    }

    #[test]
    fn test_check_file_order() {
        assert_eq!(
            check_file(SourceType::Pdf, "image/png", 10),
            Err(ValidationError::UnsupportedFile { mime: "image/png".to_string() })
        );
        // Size is checked before the type match.
        assert_eq!(
            check_file(SourceType::Doc, "application/pdf", MAX_UPLOAD_BYTES + 1),
            Err(ValidationError::FileTooLarge { size: MAX_UPLOAD_BYTES + 1 })
        );
        assert!(check_file(SourceType::Txt, "text/plain", MAX_UPLOAD_BYTES).is_ok());
    }

    #[tokio::test]
    async fn test_form_fields_checked_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_file(dir.path(), "notes.pdf", b"%PDF-1.4");

        let err = prepare_upload(&form(" ", Some(SourceType::Pdf), Some(pdf.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ValidationError::Required { field: "title" })));

        let err = prepare_upload(&form("Notes", None, Some(pdf))).await.unwrap_err();
        assert_eq!(err.to_string(), "Please select a file type.");

        let err = prepare_upload(&form("Notes", Some(SourceType::Pdf), None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please select a file.");
    }

    #[tokio::test]
    async fn test_pdf_file_with_doc_type_rejected_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_file(dir.path(), "handbook.pdf", b"%PDF-1.4");
        let (fake, manager) = setup(admin_backend());

        let err = manager
            .create(&form("Handbook", Some(SourceType::Doc), Some(pdf)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::TypeMismatch {
                chosen: SourceType::Doc,
                detected: SourceType::Pdf
            })
        ));
        assert!(manager.error().unwrap().contains("Please select a DOC file"));
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        File::create(&path).unwrap().set_len(MAX_UPLOAD_BYTES + 1).unwrap();
        let (fake, manager) = setup(admin_backend());

        let err = manager
            .create(&form("Big", Some(SourceType::Txt), Some(path)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "File size must be less than 5MB.");
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let png = write_file(dir.path(), "logo.png", b"\x89PNG");
        let (fake, manager) = setup(admin_backend());

        let err = manager
            .create(&form("Logo", Some(SourceType::Pdf), Some(png)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please select a PDF, DOC, or TXT file.");
        assert_eq!(fake.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_uploads_and_prepends() {
        let dir = tempfile::tempdir().unwrap();
        let txt = write_file(dir.path(), "faq.txt", b"Q: hours? A: 9-5");
        let (fake, manager) = setup(admin_backend().with_datasources(vec![datasource(
            1,
            "Old",
            SourceType::Pdf,
            ProcessingStatus::Completed,
        )]));
        manager.list().await.unwrap();

        let mut new = form("  FAQ ", Some(SourceType::Txt), Some(txt));
        new.description = "Support answers".to_string();
        let created = manager.create(&new).await.unwrap();

        let upload = fake.last_upload().unwrap();
        assert_eq!(upload.title, "FAQ");
        assert_eq!(upload.file_name, "faq.txt");
        assert_eq!(upload.mime, "text/plain");
        assert_eq!(upload.description.as_deref(), Some("Support answers"));
        assert_eq!(upload.bytes, b"Q: hours? A: 9-5");

        let items = manager.items();
        assert_eq!(items[0].id, created.id);
        assert_eq!(items.len(), 2);
        assert!(!manager.snapshot().busy);
    }

    #[tokio::test]
    async fn test_process_refused_for_completed_source() {
        let (fake, manager) = setup(admin_backend().with_datasources(vec![datasource(
            4,
            "Done",
            SourceType::Pdf,
            ProcessingStatus::Completed,
        )]));
        manager.list().await.unwrap();

        let err = manager.process(DataSourceId(4), None).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Validation(ValidationError::NotProcessable { status: ProcessingStatus::Completed })
        ));
        assert_eq!(fake.calls(Endpoint::ProcessDataSource), 0);
    }

    #[tokio::test]
    async fn test_process_failed_source_records_status() {
        let (fake, manager) = setup(admin_backend().with_datasources(vec![datasource(
            5,
            "Retry",
            SourceType::Txt,
            ProcessingStatus::Failed,
        )]));
        manager.list().await.unwrap();

        let config = ProcessConfig {
            chunk_size: Some(500),
            ..Default::default()
        };
        let outcome = manager.process(DataSourceId(5), Some(&config)).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Completed);
        assert_eq!(manager.items()[0].processing_status, ProcessingStatus::Completed);
        assert_eq!(fake.calls(Endpoint::ProcessDataSource), 1);
        // No follow-up fetch happens on its own.
        assert_eq!(fake.calls(Endpoint::ListDataSources), 1);
    }

    #[tokio::test]
    async fn test_non_admin_sees_server_error() {
        let (_fake, manager) = setup(FakeBackend::new().signed_in(user(2, "ana", UserRole::User)));

        assert!(manager.list().await.is_err());
        assert_eq!(
            manager.error().as_deref(),
            Some("You do not have permission to perform this action.")
        );
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_fake, manager) = setup(admin_backend().with_datasources(vec![
            datasource(1, "One", SourceType::Pdf, ProcessingStatus::Unprocessed),
            datasource(2, "Two", SourceType::Doc, ProcessingStatus::Unprocessed),
        ]));
        manager.list().await.unwrap();
        manager.get(DataSourceId(2)).await.unwrap();

        let update = DataSourceUpdate {
            title: Some("Second".to_string()),
            description: None,
        };
        manager.update(DataSourceId(2), &update).await.unwrap();
        let state = manager.snapshot();
        assert_eq!(state.items[1].title, "Second");
        assert_eq!(state.current.as_ref().unwrap().title, "Second");

        manager.delete(DataSourceId(2)).await.unwrap();
        let state = manager.snapshot();
        assert_eq!(state.items.len(), 1);
        assert!(state.current.is_none());
    }

    #[tokio::test]
    async fn test_blank_title_update_rejected() {
        let (fake, manager) = setup(admin_backend());
        let update = DataSourceUpdate {
            title: Some("  ".to_string()),
            description: None,
        };
        assert!(manager.update(DataSourceId(1), &update).await.is_err());
        assert_eq!(manager.error().as_deref(), Some("title is required"));
        assert_eq!(fake.total_calls(), 0);
    }
}
