//! Disposable address issuance.

use crate::app::AppState;
use axum::{Json, extract::State};
use rand::Rng;
use serde::Serialize;

const LOCAL_PART_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const LOCAL_PART_LEN: usize = 8;

#[derive(Debug, Serialize)]
pub struct AddressResponse {
  pub address: String,
}

pub async fn new_address(State(state): State<AppState>) -> Json<AddressResponse> {
  let mut rng = rand::thread_rng();
  let local: String = (0..LOCAL_PART_LEN)
    .map(|_| LOCAL_PART_CHARS[rng.gen_range(0..LOCAL_PART_CHARS.len())] as char)
    .collect();
  Json(AddressResponse {
    address: format!("{}@{}", local, state.config.email_domain),
  })
}
