use serde_json::json;
use tracing::debug;

use crate::app::AppState;
use crate::ws::frames::{ReqFrame, ResFrame};

/// Route one request to the engine. Never fails; errors become `ok: false`.
pub fn dispatch(req: &ReqFrame, app: &AppState) -> ResFrame {
    debug!(method = %req.method, id = %req.id, "ws request");
    match req.method.as_str() {
        "start" => {
            let generation = app.engine.start();
            ResFrame::ok(&req.id, json!({ "generation": generation }))
        }
        "cancel" => {
            app.engine.cancel();
            ResFrame::ok(&req.id, json!({ "generation": app.engine.generation() }))
        }
        "databases" => ResFrame::ok(&req.id, app.engine.list_database_names()),
        "lineages" => ResFrame::ok(&req.id, app.engine.lineages()),
        other => ResFrame::err(&req.id, "UNKNOWN_METHOD", &format!("unknown method: {other}")),
    }
}
