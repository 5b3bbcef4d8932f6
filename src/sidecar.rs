use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::ipc::{self, AppState};

/// Serves line-delimited JSON requests until `input` hits EOF.
pub fn run<R: BufRead, W: Write>(state: &mut AppState, mut input: R, mut output: W) -> anyhow::Result<()> {
    info!("sidecar ready");
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }

        let parsed = std::str::from_utf8(&buf)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(None);
                }
                serde_json::from_str::<ipc::Request>(line)
                    .map(Some)
                    .map_err(|e| e.to_string())
            });

        let resp = match parsed {
            Ok(None) => continue,
            Ok(Some(req)) => ipc::handle_request(state, req),
            Err(message) => {
                // Can't reply without id; answer anonymously.
                debug!(error = %message, "unparsable request line");
                serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": message }
                })
            }
        };
        writeln!(output, "{}", resp)?;
        output.flush()?;
    }
    info!("sidecar input closed");
    Ok(())
}
