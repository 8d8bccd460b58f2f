#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletConnectorError {
    InsufficientBalance,
    RouteNotFound,
    NotFound,
    FailedToConnect,
    FailedToCreateInvoice,
    FailedToSendPayment,
    FailedToGetNodeInfo,
    Internal,
}

impl std::fmt::Display for WalletConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
