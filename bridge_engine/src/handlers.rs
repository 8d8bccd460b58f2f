//! Per-method request handlers.

use std::future::Future;

use serde_json::json;
use slog as log;

use core_types::event::Event;
use core_types::payload::{
    BalanceResponse, ErrorCode, GetInfoResponse, KeysendParams, ListTransactionsParams,
    ListTransactionsResponse, LookupInvoiceParams, MakeInvoiceParams, MultiPayInvoiceParams,
    MultiPayKeysendParams, PayInvoiceParams, PayResponse, Request, Response,
};
use models::apps::App;
use wallet_connector::WalletConnector;
use xerror::wallet_connector::WalletConnectorError;

use crate::engine::BridgeEngine;
use crate::policy;
use crate::repository::Repository;

const DEFAULT_INVOICE_EXPIRY_SECONDS: u64 = 86400;

impl BridgeEngine {
    pub(crate) async fn handle_pay_invoice(
        &self,
        app: &App,
        request_event_id: i64,
        request: &Request,
    ) -> Response {
        let params: PayInvoiceParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse payment parameters: {}", err),
                )
            }
        };
        let amount_msat = params.amount.unwrap_or(0);

        log::info!(self.logger, "Sending payment";
            "app_id" => app.id, "invoice" => %params.invoice);

        self.execute_payment(
            app,
            request_event_id,
            &request.method,
            amount_msat,
            Some(params.invoice.clone()),
            self.wallet.send_payment(params.invoice.clone()),
        )
        .await
    }

    pub(crate) async fn handle_pay_keysend(
        &self,
        app: &App,
        request_event_id: i64,
        request: &Request,
    ) -> Response {
        let params: KeysendParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse keysend parameters: {}", err),
                )
            }
        };

        log::info!(self.logger, "Sending keysend payment";
            "app_id" => app.id, "recipient_pubkey" => %params.pubkey);

        self.execute_payment(
            app,
            request_event_id,
            &request.method,
            params.amount,
            None,
            self.wallet.send_keysend(
                params.amount,
                params.pubkey.clone(),
                params.preimage.clone(),
                params.tlv_records.clone(),
            ),
        )
        .await
    }

    pub(crate) async fn handle_multi_pay_invoice(
        &self,
        event: &Event,
        app: &App,
        request_event_id: i64,
        request: &Request,
        shared_secret: &[u8; 32],
    ) {
        let params: MultiPayInvoiceParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                let response = Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse payment parameters: {}", err),
                );
                self.send_sub_response(event, app, request_event_id, response, vec![], shared_secret)
                    .await;
                return;
            }
        };

        // Sub-requests are independent: one failure does not halt the batch.
        let tasks = params.invoices.into_iter().enumerate().map(|(index, element)| {
            let method = request.method.clone();
            async move {
                let d_tag = element.id.clone().unwrap_or_else(|| index.to_string());
                let amount_msat = element.amount.unwrap_or(0);
                let response = self
                    .execute_payment(
                        app,
                        request_event_id,
                        &method,
                        amount_msat,
                        Some(element.invoice.clone()),
                        self.wallet.send_payment(element.invoice.clone()),
                    )
                    .await;
                self.send_sub_response(
                    event,
                    app,
                    request_event_id,
                    response,
                    vec![vec!["d".to_string(), d_tag]],
                    shared_secret,
                )
                .await;
            }
        });
        futures_util::future::join_all(tasks).await;
    }

    pub(crate) async fn handle_multi_pay_keysend(
        &self,
        event: &Event,
        app: &App,
        request_event_id: i64,
        request: &Request,
        shared_secret: &[u8; 32],
    ) {
        let params: MultiPayKeysendParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                let response = Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse keysend parameters: {}", err),
                );
                self.send_sub_response(event, app, request_event_id, response, vec![], shared_secret)
                    .await;
                return;
            }
        };

        let tasks = params.keysends.into_iter().enumerate().map(|(index, element)| {
            let method = request.method.clone();
            async move {
                let d_tag = element.id.clone().unwrap_or_else(|| index.to_string());
                let response = self
                    .execute_payment(
                        app,
                        request_event_id,
                        &method,
                        element.amount,
                        None,
                        self.wallet.send_keysend(
                            element.amount,
                            element.pubkey.clone(),
                            element.preimage.clone(),
                            element.tlv_records.clone(),
                        ),
                    )
                    .await;
                self.send_sub_response(
                    event,
                    app,
                    request_event_id,
                    response,
                    vec![vec!["d".to_string(), d_tag]],
                    shared_secret,
                )
                .await;
            }
        });
        futures_util::future::join_all(tasks).await;
    }

    pub(crate) async fn handle_get_balance(&self, app: &App, request: &Request) -> Response {
        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, &request.method, 0) {
            return Response::error(&request.method, code, message);
        }
        match self.wallet.get_balance().await {
            Ok(balance) => Response::result(&request.method, &BalanceResponse { balance }),
            Err(err) => Response::error(&request.method, ErrorCode::Internal, err.to_string()),
        }
    }

    pub(crate) async fn handle_make_invoice(&self, app: &App, request: &Request) -> Response {
        let params: MakeInvoiceParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse invoice parameters: {}", err),
                )
            }
        };
        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, &request.method, 0) {
            return Response::error(&request.method, code, message);
        }

        match self
            .wallet
            .make_invoice(
                params.amount,
                params.description,
                params.description_hash,
                params.expiry.unwrap_or(DEFAULT_INVOICE_EXPIRY_SECONDS),
            )
            .await
        {
            Ok(transaction) => Response::result(&request.method, &transaction),
            Err(err) => Response::error(&request.method, ErrorCode::Internal, err.to_string()),
        }
    }

    pub(crate) async fn handle_lookup_invoice(&self, app: &App, request: &Request) -> Response {
        let params: LookupInvoiceParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse lookup parameters: {}", err),
                )
            }
        };
        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, &request.method, 0) {
            return Response::error(&request.method, code, message);
        }

        let payment_hash = match params.payment_hash {
            Some(payment_hash) => payment_hash,
            None => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    "Missing payment_hash parameter",
                )
            }
        };

        match self.wallet.lookup_invoice(payment_hash).await {
            Ok(transaction) => Response::result(&request.method, &transaction),
            Err(WalletConnectorError::NotFound) => {
                Response::error(&request.method, ErrorCode::Other, "Invoice not found")
            }
            Err(err) => Response::error(&request.method, ErrorCode::Internal, err.to_string()),
        }
    }

    pub(crate) async fn handle_list_transactions(&self, app: &App, request: &Request) -> Response {
        let params: ListTransactionsParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(err) => {
                return Response::error(
                    &request.method,
                    ErrorCode::Other,
                    format!("Failed to parse list parameters: {}", err),
                )
            }
        };
        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, &request.method, 0) {
            return Response::error(&request.method, code, message);
        }

        match self
            .wallet
            .list_transactions(
                params.from.unwrap_or(0),
                params.until.unwrap_or(0),
                params.limit.unwrap_or(0),
                params.offset.unwrap_or(0),
                params.unpaid.unwrap_or(false),
                params.transaction_type,
            )
            .await
        {
            Ok(transactions) => {
                Response::result(&request.method, &ListTransactionsResponse { transactions })
            }
            Err(err) => Response::error(&request.method, ErrorCode::Internal, err.to_string()),
        }
    }

    pub(crate) async fn handle_get_info(&self, app: &App, request: &Request) -> Response {
        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, &request.method, 0) {
            return Response::error(&request.method, code, message);
        }
        let info = match self.wallet.get_info().await {
            Ok(info) => info,
            Err(err) => return Response::error(&request.method, ErrorCode::Internal, err.to_string()),
        };
        let methods = self.repo.list_permission_methods(app.id).unwrap_or_default();
        Response::result(
            &request.method,
            &GetInfoResponse {
                alias: info.alias,
                color: info.color,
                pubkey: info.pubkey,
                network: info.network,
                block_height: info.block_height,
                block_hash: info.block_hash,
                methods,
            },
        )
    }

    async fn send_sub_response(
        &self,
        event: &Event,
        app: &App,
        request_event_id: i64,
        response: Response,
        extra_tags: Vec<Vec<String>>,
        shared_secret: &[u8; 32],
    ) {
        match self.create_response(event, &response, extra_tags, shared_secret) {
            Ok(resp) => {
                self.publish_response(event, Some(app.id), Some(request_event_id), resp, shared_secret)
                    .await;
            }
            Err(err) => {
                log::error!(self.logger, "Failed to build response, error: {}", err;
                    "event_id" => %event.id, "app_id" => app.id);
            }
        }
    }

    /// Budget check, payment row, backend call and preimage update, all
    /// under the app's payment lock.
    async fn execute_payment<F>(
        &self,
        app: &App,
        request_event_id: i64,
        method: &str,
        amount_msat: u64,
        payment_request: Option<String>,
        op: F,
    ) -> Response
    where
        F: Future<Output = Result<String, WalletConnectorError>>,
    {
        let lock = self.payment_lock(app.id);
        let _guard = lock.lock().await;

        if let Err((code, message)) = policy::authorize(self.repo.as_ref(), app, method, amount_msat) {
            return Response::error(method, code, message);
        }

        let amount_sats = (amount_msat / 1000) as i64;
        let payment_id = match self.repo.insert_payment(
            app.id,
            request_event_id,
            amount_sats,
            payment_request.as_deref(),
        ) {
            Ok(id) => id,
            Err(err) => {
                log::error!(self.logger, "Failed to record payment, error: {}", err;
                    "app_id" => app.id);
                return Response::error(method, ErrorCode::Internal, "Failed to record payment");
            }
        };

        match op.await {
            Ok(preimage) => {
                if let Err(err) = self.repo.update_payment_preimage(payment_id, &preimage) {
                    log::error!(self.logger, "Failed to store preimage, error: {}", err;
                        "app_id" => app.id);
                }
                self.event_logger.log(
                    "payment_succeeded",
                    json!({ "method": method, "amount": amount_sats }),
                );
                Response::result(method, &PayResponse { preimage })
            }
            Err(err) => {
                log::info!(self.logger, "Failed to send payment, error: {}", err;
                    "app_id" => app.id);
                self.event_logger.log(
                    "payment_failed",
                    json!({ "method": method, "amount": amount_sats }),
                );
                let code = match err {
                    WalletConnectorError::InsufficientBalance => ErrorCode::InsufficientBalance,
                    WalletConnectorError::RouteNotFound | WalletConnectorError::FailedToSendPayment => {
                        ErrorCode::PaymentFailed
                    }
                    _ => ErrorCode::Internal,
                };
                Response::error(method, code, err.to_string())
            }
        }
    }
}
