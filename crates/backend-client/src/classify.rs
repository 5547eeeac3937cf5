//! Maps backend error responses onto [`GatewayError`].
//!
//! The backend is not consistent about codes, so the message text is checked
//! as well. Item-level failures win over a bare 404.

use domain::ports::GatewayError;
use reqwest::StatusCode;
use serde::Deserialize;

pub const CODE_NOT_MODIFIABLE: &str = "ORDER_NOT_MODIFIABLE";
pub const CODE_ITEM_NOT_FOUND: &str = "ITEM_NOT_FOUND";

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn classify(status: StatusCode, resource_id: &str, body: &str) -> GatewayError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| body.trim().to_string());
    let lowered = message.to_lowercase();

    if code == CODE_NOT_MODIFIABLE || lowered.contains("cannot be modified") {
        GatewayError::NotModifiable { resource_id: resource_id.to_string(), message }
    } else if code == CODE_ITEM_NOT_FOUND || lowered.contains("item not found") {
        GatewayError::ItemNotFound { resource_id: resource_id.to_string(), message }
    } else if status == StatusCode::NOT_FOUND {
        GatewayError::NotFound { entity: resource_id.to_string() }
    } else {
        GatewayError::Rejected { status: status.as_u16(), message }
    }
}
