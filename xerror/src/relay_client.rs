#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayClientError {
    FailedToConnect,
    ConnectionClosed,
    FailedToSend,
    SubscriptionLimit,
}

impl std::fmt::Display for RelayClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
