//! Fallback handler for a resolved-but-unimplemented, or genuinely
//! unknown, module type: exposes only its type string, nothing else.

use serde_json::{json, Value};

use velbus_proto::frame::VelbusFrame;
use velbus_state::JsonPatch;

use crate::context::ModuleContext;
use crate::error::ModuleError;
use crate::http::{HttpMethod, HttpResponse, HttpResult};

#[derive(Debug, Clone)]
pub struct UnknownHandler {
    pub type_name: String,
}

impl UnknownHandler {
    pub fn new(type_name: impl Into<String>) -> Self {
        UnknownHandler {
            type_name: type_name.into(),
        }
    }

    pub fn message(&mut self, _frame: &VelbusFrame) -> JsonPatch {
        JsonPatch::new()
    }

    pub fn state_value(&self) -> Value {
        json!({"type": self.type_name})
    }

    pub async fn dispatch_http(
        &mut self,
        _ctx: &ModuleContext,
        method: HttpMethod,
        path: &[String],
        _body: Option<Value>,
    ) -> HttpResult {
        match (method, path) {
            (HttpMethod::Get, [p]) if p == "type" => {
                Ok(HttpResponse::ok(Value::from(self.type_name.clone())))
            }
            _ => Err(ModuleError::NotFound {
                method: method.suffix().to_string(),
                path: path.join("/"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exposes_only_its_type_string() {
        let mut h = UnknownHandler::new("VMB_SOME_FUTURE_MODULE");
        assert_eq!(h.state_value(), json!({"type": "VMB_SOME_FUTURE_MODULE"}));

        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let resp = h
            .dispatch_http(&ctx, HttpMethod::Get, &["type".to_string()], None)
            .await
            .unwrap();
        assert_eq!(resp.body, Value::from("VMB_SOME_FUTURE_MODULE"));

        let err = h
            .dispatch_http(&ctx, HttpMethod::Get, &["other".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::NotFound { .. }));
    }
}
