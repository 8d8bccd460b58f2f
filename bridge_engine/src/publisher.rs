//! Response publishing: persist first, publish, then record the outcome.

use slog as log;

use core_types::event::Event;
use core_types::{
    RESPONSE_EVENT_STATE_CONFIRMED, RESPONSE_EVENT_STATE_FAILED, RESPONSE_EVENT_STATE_UNCONFIRMED,
};
use relay_client::{PublishStatus, RelayClient};

use crate::engine::BridgeEngine;
use crate::envelope;
use crate::repository::Repository;

impl BridgeEngine {
    /// Persist the response (state `received`, ciphertext alongside the
    /// decrypted payload), publish it, and record the publish outcome. If
    /// the decrypt-for-logging step fails the publish is aborted.
    pub(crate) async fn publish_response(
        &self,
        request_event: &Event,
        app_id: Option<i64>,
        request_event_id: Option<i64>,
        resp: Event,
        shared_secret: &[u8; 32],
    ) {
        let decrypted = match envelope::decrypt(&resp.content, shared_secret) {
            Ok(decrypted) => decrypted,
            Err(err) => {
                log::error!(self.logger, "Failed to decrypt response content, error: {}", err;
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
                return;
            }
        };

        let response_event_id = match self.repo.insert_response_event(
            app_id,
            request_event_id,
            &resp.id,
            &resp.content,
            &decrypted,
        ) {
            Ok(id) => id,
            Err(err) => {
                log::error!(self.logger, "Failed to persist response event, error: {}", err;
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
                return;
            }
        };

        match self.relay.publish(&resp).await {
            Ok(PublishStatus::Succeeded) => {
                let now = utils::time::time_now() as i64;
                if let Err(err) =
                    self.repo
                        .set_response_event_replied(response_event_id, RESPONSE_EVENT_STATE_CONFIRMED, now)
                {
                    log::error!(self.logger, "Failed to update response state, error: {}", err;
                        "reply_event_id" => %resp.id);
                }
                if let Some(request_event_id) = request_event_id {
                    if let Err(err) = self.repo.set_request_event_replied(request_event_id, now) {
                        log::error!(self.logger, "Failed to update request replied_at, error: {}", err;
                            "event_id" => %request_event.id);
                    }
                }
                log::info!(self.logger, "Published reply";
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
            }
            Ok(PublishStatus::Failed) => {
                if let Err(err) = self
                    .repo
                    .update_response_event_state(response_event_id, RESPONSE_EVENT_STATE_FAILED)
                {
                    log::error!(self.logger, "Failed to update response state, error: {}", err;
                        "reply_event_id" => %resp.id);
                }
                log::info!(self.logger, "Failed to publish reply";
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
            }
            Ok(PublishStatus::Unconfirmed) => {
                if let Err(err) = self
                    .repo
                    .update_response_event_state(response_event_id, RESPONSE_EVENT_STATE_UNCONFIRMED)
                {
                    log::error!(self.logger, "Failed to update response state, error: {}", err;
                        "reply_event_id" => %resp.id);
                }
                log::info!(self.logger, "Reply sent but no response from relay (timeout)";
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
            }
            Err(err) => {
                log::error!(self.logger, "Failed to publish reply, error: {}", err;
                    "event_id" => %request_event.id, "reply_event_id" => %resp.id);
            }
        }
    }
}
