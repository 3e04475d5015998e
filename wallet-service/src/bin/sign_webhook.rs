//! Prints a signed `charge.success` webhook body for local testing.
//!
//! Usage: `sign-webhook <email> [reference] [amount_in_minor_units]`
//!
//! Reads `PAYSTACK_SECRET_KEY` from the environment (or `.env`). Send the
//! printed body byte for byte with the printed `x-paystack-signature`.

use anyhow::{bail, Context, Result};
use serde_json::json;
use service_core::utils::signature::sign_payload;
use wallet_service::services::webhook::{CHARGE_SUCCESS, SIGNATURE_HEADER};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let Some(email) = args.next() else {
        bail!("usage: sign-webhook <email> [reference] [amount_in_minor_units]");
    };
    let reference = args
        .next()
        .unwrap_or_else(|| format!("test_ref_{}", chrono::Utc::now().timestamp_millis()));
    let amount: i64 = match args.next() {
        Some(raw) => raw.parse().context("amount must be an integer")?,
        None => 500000,
    };

    let secret =
        std::env::var("PAYSTACK_SECRET_KEY").context("PAYSTACK_SECRET_KEY must be set")?;

    let body = json!({
        "event": CHARGE_SUCCESS,
        "data": {
            "reference": reference,
            "amount": amount,
            "status": "success",
            "customer": { "email": email }
        }
    })
    .to_string();
    let signature = sign_payload(secret.as_bytes(), body.as_bytes())?;

    println!("{}: {}", SIGNATURE_HEADER, signature);
    println!("{}", body);
    Ok(())
}
