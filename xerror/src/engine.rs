#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    DatabaseUnavailable,
    QueryFailed,
    InfoPublishFailed,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
