//! Provider callback payload normalization.
//!
//! Callback bodies are accepted as opaque JSON and reduced to the two
//! facts reconciliation needs: which transaction the provider means, and
//! how it resolved. Anything that cannot be reduced is malformed and is
//! acknowledged without touching state.

use serde_json::Value;

/// How a provider resolved a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentResolution {
    /// Funds collected.
    Success,

    /// The subscriber dismissed the prompt.
    Cancelled,

    /// Any other outcome, including result codes this service does not
    /// recognize.
    Failed,
}

/// A provider callback reduced to its correlating facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// The provider transaction handle issued at push time.
    pub transaction_id: String,

    pub resolution: PaymentResolution,
}

/// The observable result of processing a callback.
///
/// None of these is an error towards the provider; the webhook always
/// acknowledges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The payment was pending and the resolution was applied.
    Applied,

    /// The payment had already reached a terminal state; no-op.
    AlreadySettled,

    /// No payment carries this transaction handle; no-op.
    Unmatched,

    /// The payload could not be understood; no-op.
    Malformed,
}

/// M-Pesa subscriber-cancelled result code.
const MPESA_RESULT_CANCELLED: i64 = 1032;

/// Reduces a Daraja STK callback body.
///
/// Shape: `{"Body": {"stkCallback": {"CheckoutRequestID": "...",
/// "ResultCode": 0, "ResultDesc": "..."}}}`. `ResultCode` 0 is success,
/// 1032 is subscriber cancellation, anything else is failure.
pub fn parse_mpesa_callback(payload: &Value) -> Option<CallbackEvent> {
    let callback = payload.pointer("/Body/stkCallback")?;

    let transaction_id = callback
        .get("CheckoutRequestID")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?
        .to_string();

    let result_code = callback.get("ResultCode").and_then(Value::as_i64)?;

    let resolution = match result_code {
        0 => PaymentResolution::Success,
        MPESA_RESULT_CANCELLED => PaymentResolution::Cancelled,
        _ => PaymentResolution::Failed,
    };

    Some(CallbackEvent {
        transaction_id,
        resolution,
    })
}

/// Reduces an Airtel Money settlement callback body.
///
/// Shape: `{"transaction": {"id": "...", "status_code": "TS"}}`. `TS`
/// is success, `TF` is failure; unrecognized codes count as failure.
pub fn parse_airtel_callback(payload: &Value) -> Option<CallbackEvent> {
    let transaction = payload.get("transaction")?;

    let transaction_id = transaction
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?
        .to_string();

    let status_code = transaction.get("status_code").and_then(Value::as_str)?;

    let resolution = match status_code {
        "TS" => PaymentResolution::Success,
        _ => PaymentResolution::Failed,
    };

    Some(CallbackEvent {
        transaction_id,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mpesa_success_callback() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            {"Name": "Amount", "Value": 1360.00},
                            {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"}
                        ]
                    }
                }
            }
        });

        let event = parse_mpesa_callback(&payload).unwrap();
        assert_eq!(event.transaction_id, "ws_CO_191220191020363925");
        assert_eq!(event.resolution, PaymentResolution::Success);
    }

    #[test]
    fn mpesa_subscriber_cancel_maps_to_cancelled() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user"
                }
            }
        });

        let event = parse_mpesa_callback(&payload).unwrap();
        assert_eq!(event.resolution, PaymentResolution::Cancelled);
    }

    #[test]
    fn mpesa_unknown_result_code_maps_to_failed() {
        let payload = json!({
            "Body": {
                "stkCallback": {
                    "CheckoutRequestID": "ws_CO_1",
                    "ResultCode": 9999,
                    "ResultDesc": "Some future result"
                }
            }
        });

        let event = parse_mpesa_callback(&payload).unwrap();
        assert_eq!(event.resolution, PaymentResolution::Failed);
    }

    #[test]
    fn mpesa_missing_fields_is_malformed() {
        assert!(parse_mpesa_callback(&json!({})).is_none());
        assert!(parse_mpesa_callback(&json!({"Body": {}})).is_none());
        assert!(
            parse_mpesa_callback(&json!({
                "Body": {"stkCallback": {"ResultCode": 0}}
            }))
            .is_none()
        );
        assert!(
            parse_mpesa_callback(&json!({
                "Body": {"stkCallback": {"CheckoutRequestID": "ws_CO_1"}}
            }))
            .is_none()
        );
    }

    #[test]
    fn airtel_settlement_codes() {
        let success = json!({"transaction": {"id": "TXN-1", "status_code": "TS", "message": "ok"}});
        let event = parse_airtel_callback(&success).unwrap();
        assert_eq!(event.transaction_id, "TXN-1");
        assert_eq!(event.resolution, PaymentResolution::Success);

        let failed = json!({"transaction": {"id": "TXN-2", "status_code": "TF"}});
        assert_eq!(
            parse_airtel_callback(&failed).unwrap().resolution,
            PaymentResolution::Failed
        );

        let unknown = json!({"transaction": {"id": "TXN-3", "status_code": "XX"}});
        assert_eq!(
            parse_airtel_callback(&unknown).unwrap().resolution,
            PaymentResolution::Failed
        );
    }

    #[test]
    fn airtel_missing_fields_is_malformed() {
        assert!(parse_airtel_callback(&json!({})).is_none());
        assert!(parse_airtel_callback(&json!({"transaction": {"id": "TXN-1"}})).is_none());
        assert!(
            parse_airtel_callback(&json!({"transaction": {"status_code": "TS"}})).is_none()
        );
    }
}
