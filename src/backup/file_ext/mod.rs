/// Provides the suffix appended to a snapshot once it has been archived
pub trait FileExtProvider {
    /// Extension without the leading dot, e.g. `tar.zst`
    fn file_ext(&self) -> Option<&'static str>;

    /// Extension with the leading dot, or an empty string
    fn file_suffix(&self) -> String {
        self.file_ext().map(|ext| format!(".{ext}")).unwrap_or_default()
    }
}
