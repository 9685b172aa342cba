/// Failure to build a [`Config`](crate::Config).
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ExtractConfigError {
    /// A layer could not be read, or its values do not fit the config schema.
    #[error("failed to extract atm config:\n{}", list(.0))]
    Figment(#[from] figment::Error),
    /// A setting was read but its value is not usable.
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ExtractConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { key, reason: reason.into() }
    }

    /// The setting at fault, if the failure concerns a single setting.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::Figment(err) if !err.path.is_empty() => Some(err.path.join(".")),
            Self::Figment(_) => None,
            Self::Invalid { key, .. } => Some((*key).to_string()),
        }
    }
}

/// One line per underlying error; a figment error may carry several.
fn list(error: &figment::Error) -> String {
    error.clone().into_iter().map(|err| format!("  {err}")).collect::<Vec<_>>().join("\n")
}
