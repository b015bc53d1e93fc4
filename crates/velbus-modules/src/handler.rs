//! `ModuleHandler`: the common enum every resolved address dispatches
//! through. Wraps each concrete per-type handler plus the `Unknown`
//! fallback so the registry can hold one homogeneous map regardless of
//! hardware family (§4.6, §4.7).

use serde_json::Value;

use velbus_proto::frame::VelbusFrame;
use velbus_proto::moduleinfo::ModuleInfo;
use velbus_state::JsonPatch;

use crate::context::ModuleContext;
use crate::http::{HttpMethod, HttpResult};
use crate::modules::unknown::UnknownHandler;
use crate::modules::vmb1ts::Vmb1TsHandler;
use crate::modules::vmb2bl::Vmb2BlHandler;
use crate::modules::vmb4dc::Vmb4DcHandler;
use crate::modules::vmb4ryno::Vmb4RynoHandler;
use crate::modules::vmb6in::Vmb6InHandler;
use crate::modules::vmbble::VmbBleHandler;
use crate::modules::vmbdali::VmbDaliHandler;
use crate::modules::vmbgpod::VmbGpodHandler;

pub enum ModuleHandler {
    Vmb4Ryno(Vmb4RynoHandler),
    Vmb4Dc(Vmb4DcHandler),
    Vmb2Bl(Vmb2BlHandler),
    VmbBle(VmbBleHandler),
    Vmb6In(Vmb6InHandler),
    Vmb1Ts(Vmb1TsHandler),
    VmbGpod(VmbGpodHandler),
    VmbDali(VmbDaliHandler),
    Unknown(UnknownHandler),
}

impl ModuleHandler {
    /// Constructs the handler for a resolved `ModuleInfo`, per the
    /// module-type -> handler mapping in §4.6.
    pub fn from_module_info(info: &ModuleInfo) -> Self {
        match info {
            ModuleInfo::Vmb4ryno(_) => ModuleHandler::Vmb4Ryno(Vmb4RynoHandler::new()),
            ModuleInfo::Vmb4Dc(_) => ModuleHandler::Vmb4Dc(Vmb4DcHandler::new()),
            ModuleInfo::Vmb2Bl(_) => ModuleHandler::Vmb2Bl(Vmb2BlHandler::new()),
            ModuleInfo::Vmb2Ble(_) => ModuleHandler::VmbBle(VmbBleHandler::new()),
            ModuleInfo::Vmb6In(_) => ModuleHandler::Vmb6In(Vmb6InHandler::new()),
            ModuleInfo::Vmb1Ts(_) => ModuleHandler::Vmb1Ts(Vmb1TsHandler::new()),
            ModuleInfo::Vmbgpod(_) => ModuleHandler::VmbGpod(VmbGpodHandler::new()),
            ModuleInfo::VmbDali(_) => ModuleHandler::VmbDali(VmbDaliHandler::new()),
            ModuleInfo::Unknown(_) => {
                ModuleHandler::Unknown(UnknownHandler::new("unknown"))
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ModuleHandler::Vmb4Ryno(_) => "VMB4RYNO",
            ModuleHandler::Vmb4Dc(_) => "VMB4DC",
            ModuleHandler::Vmb2Bl(_) => "VMB2BL",
            ModuleHandler::VmbBle(_) => "VMB2BLE",
            ModuleHandler::Vmb6In(_) => "VMB6IN",
            ModuleHandler::Vmb1Ts(_) => "VMB1TS",
            ModuleHandler::VmbGpod(_) => "VMBGPOD",
            ModuleHandler::VmbDali(_) => "VMBDALI",
            ModuleHandler::Unknown(_) => "unknown",
        }
    }

    /// Feeds an inbound bus frame into state, returning the patch it
    /// produced. Synchronous by design: ordering of state mutations
    /// relative to frame arrival order is load-bearing (§5).
    pub fn message(&mut self, frame: &VelbusFrame) -> JsonPatch {
        match self {
            ModuleHandler::Vmb4Ryno(h) => h.message(frame),
            ModuleHandler::Vmb4Dc(h) => h.message(frame),
            ModuleHandler::Vmb2Bl(h) => h.message(frame),
            ModuleHandler::VmbBle(h) => h.message(frame),
            ModuleHandler::Vmb6In(h) => h.message(frame),
            ModuleHandler::Vmb1Ts(h) => h.message(frame),
            ModuleHandler::VmbGpod(h) => h.message(frame),
            ModuleHandler::VmbDali(h) => h.message(frame),
            ModuleHandler::Unknown(h) => h.message(frame),
        }
    }

    pub fn state_value(&mut self) -> Value {
        match self {
            ModuleHandler::Vmb4Ryno(h) => h.state_value(),
            ModuleHandler::Vmb4Dc(h) => h.state_value(),
            ModuleHandler::Vmb2Bl(h) => h.state_value(),
            ModuleHandler::VmbBle(h) => h.state_value(),
            ModuleHandler::Vmb6In(h) => h.state_value(),
            ModuleHandler::Vmb1Ts(h) => h.state_value(),
            ModuleHandler::VmbGpod(h) => h.state_value(),
            ModuleHandler::VmbDali(h) => h.state_value(),
            ModuleHandler::Unknown(h) => h.state_value(),
        }
    }

    pub async fn dispatch_http(
        &mut self,
        ctx: &ModuleContext,
        method: HttpMethod,
        path: &[String],
        body: Option<Value>,
    ) -> HttpResult {
        match self {
            ModuleHandler::Vmb4Ryno(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::Vmb4Dc(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::Vmb2Bl(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::VmbBle(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::Vmb6In(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::Vmb1Ts(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::VmbGpod(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::VmbDali(h) => h.dispatch_http(ctx, method, path, body).await,
            ModuleHandler::Unknown(h) => h.dispatch_http(ctx, method, path, body).await,
        }
    }

    /// Spawns the background scheduled-step runner for module types
    /// that have one (VMB4RYNO, VMB4DC, VMBDALI). A no-op for every
    /// other type.
    pub fn spawn_background_tasks(&self, ctx: ModuleContext) {
        match self {
            ModuleHandler::Vmb4Ryno(h) => {
                h.spawn_runner(ctx);
            }
            ModuleHandler::Vmb4Dc(h) => {
                h.spawn_runner(ctx);
            }
            ModuleHandler::VmbDali(h) => {
                h.spawn_runner(ctx);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velbus_proto::moduleinfo::{Vmb4ryno, Vmbgpod};

    #[test]
    fn from_module_info_picks_the_matching_handler_type() {
        let h = ModuleHandler::from_module_info(&ModuleInfo::Vmb4ryno(Vmb4ryno {
            serial: 1234,
            memory_map_version: 1,
            build_year: 20,
            build_week: 5,
        }));
        assert_eq!(h.type_name(), "VMB4RYNO");

        let h = ModuleHandler::from_module_info(&ModuleInfo::Vmbgpod(Vmbgpod {
            serial: 1234,
            memory_map_version: 1,
            build_year: 20,
            build_week: 5,
        }));
        assert_eq!(h.type_name(), "VMBGPOD");

        let h = ModuleHandler::from_module_info(&ModuleInfo::Unknown(Default::default()));
        assert_eq!(h.type_name(), "unknown");
    }

    #[tokio::test]
    async fn dispatch_http_delegates_to_the_wrapped_handler() {
        let mut h = ModuleHandler::Unknown(UnknownHandler::new("VMB_X"));
        let ctx = ModuleContext {
            bus: velbus_bus::BusHandle::new(),
            address: 0x01,
            query_timeout: std::time::Duration::from_millis(50),
        };
        let resp = h
            .dispatch_http(&ctx, HttpMethod::Get, &["type".to_string()], None)
            .await
            .unwrap();
        assert_eq!(resp.body, Value::from("VMB_X"));
        assert_eq!(h.state_value(), serde_json::json!({"type": "VMB_X"}));
    }
}
