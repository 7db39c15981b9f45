//! Tool availability check

use super::Session;
use droidflash_core::MissingTool;

/// Run the check-tools command
pub fn run_check(session: &Session) -> Result<(), Box<dyn std::error::Error>> {
    let tools = session.tools();
    let result = tools.check();

    let (primary_ok, fallback_ok) = match &result {
        Ok(()) => (true, true),
        Err(e) => match e.which {
            MissingTool::Primary => (false, true),
            MissingTool::Fallback => (true, false),
            MissingTool::Both => (false, false),
        },
    };

    println!("{:<12} {}", tools.primary_program(), status(primary_ok));
    println!("{:<12} {}", tools.fallback_program(), status(fallback_ok));

    result.map_err(|e| format!("{}; program names are set in [tools]", e).into())
}

fn status(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "missing"
    }
}
