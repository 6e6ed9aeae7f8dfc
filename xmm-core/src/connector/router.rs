//! Outbound order routing over the trade channel
//!
//! Serializes place/cancel/modify operations into channel payloads.
//! Quantities are rounded to the venue's contract unit before
//! serialization; client order ids are allocated here at send time.

use serde_json::{json, Value};

use crate::core::{next_client_order_id, SizeRounder};
use crate::oms::{OrderRequest, OrderRouter};

use super::ws::WsHandle;

fn build_order_payload(request: &OrderRequest, req_id: u64, client_order_id: u64, qty: f64) -> String {
    json!({
        "id": req_id.to_string(),
        "op": "order",
        "args": [{
            "clOrdId": client_order_id.to_string(),
            "instId": request.instrument,
            "side": if request.buy { "buy" } else { "sell" },
            "ordType": request.order_type.as_str(),
            "px": format!("{}", request.price),
            "sz": format!("{}", qty),
            "tdMode": request.td_mode,
            "banAmend": request.ban_amend,
        }],
    })
    .to_string()
}

fn build_cancel_payload(client_order_id: u64, req_id: u64, instrument: &str) -> String {
    json!({
        "id": req_id.to_string(),
        "op": "cancel-order",
        "args": [{
            "clOrdId": client_order_id.to_string(),
            "instId": instrument,
        }],
    })
    .to_string()
}

fn build_modify_payload(
    client_order_id: u64,
    req_id: u64,
    instrument: &str,
    new_price: f64,
    qty: f64,
) -> String {
    json!({
        "id": req_id.to_string(),
        "op": "amend-order",
        "args": [{
            "clOrdId": client_order_id.to_string(),
            "instId": instrument,
            "newPx": format!("{}", new_price),
            "newSz": format!("{}", qty),
        }],
    })
    .to_string()
}

pub struct WsOrderRouter {
    handle: WsHandle,
    contract_unit_rounder: SizeRounder,
    heartbeat_payload: Option<String>,
}

impl WsOrderRouter {
    pub fn new(
        handle: WsHandle,
        contract_unit_rounder: SizeRounder,
        heartbeat_payload: Option<String>,
    ) -> Self {
        Self {
            handle,
            contract_unit_rounder,
            heartbeat_payload,
        }
    }
}

impl OrderRouter for WsOrderRouter {
    fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    fn send_order(&self, request: &OrderRequest, req_id: u64) -> u64 {
        let client_order_id = next_client_order_id();
        let qty = self.contract_unit_rounder.round(request.qty);
        let payload = build_order_payload(request, req_id, client_order_id, qty);
        if self.handle.send(payload) {
            client_order_id
        } else {
            0
        }
    }

    fn send_cancel_order(&self, client_order_id: u64, req_id: u64, instrument: &str) -> u64 {
        let payload = build_cancel_payload(client_order_id, req_id, instrument);
        if self.handle.send(payload) {
            client_order_id
        } else {
            0
        }
    }

    fn send_modify_order(
        &self,
        client_order_id: u64,
        new_qty: f64,
        new_price: f64,
        req_id: u64,
        instrument: &str,
    ) -> u64 {
        let qty = self.contract_unit_rounder.round(new_qty);
        let payload = build_modify_payload(client_order_id, req_id, instrument, new_price, qty);
        if self.handle.send(payload) {
            client_order_id
        } else {
            0
        }
    }

    fn send_heartbeat(&self) -> bool {
        match self.heartbeat_payload.as_ref() {
            Some(payload) => self.handle.send(payload.clone()),
            None => self.handle.send_heartbeat(),
        }
    }
}
