use domains::DomainError;

/// Result of a fail-soft read: the data is always usable (empty on failure)
/// and `error` tells the caller the read did not complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOutcome<T> {
    pub data: T,
    pub error: Option<DomainError>,
}

impl<T> ReadOutcome<T> {
    pub fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn failed(data: T, error: DomainError) -> Self {
        Self {
            data,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<T, DomainError> {
        match self.error {
            None => Ok(self.data),
            Some(err) => Err(err),
        }
    }
}
