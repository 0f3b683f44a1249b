use loom_core::error::LoomError;
use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Structured error body written to stderr.
pub fn error_body(code: &str, message: &str, docs_hint: Option<&str>) -> serde_json::Value {
    let mut err = json!({
        "error": code,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    err
}

fn print_error(body: &serde_json::Value) {
    match serde_json::to_string_pretty(body) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{body}"),
    }
}

/// Exit code for invalid command-line usage.
pub const USAGE_EXIT_CODE: i32 = 4;

/// Report a usage error and exit with [`USAGE_EXIT_CODE`].
pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    print_error(&error_body("cli_error", message, docs_hint));
    std::process::exit(USAGE_EXIT_CODE);
}

/// Hint shown next to a library failure, keyed by its error code.
fn docs_hint(err: &LoomError) -> Option<&'static str> {
    use loom_core::error::codes;
    match err.code() {
        codes::GENERATOR_FAILED => {
            Some("Check ANTHROPIC_API_KEY and ANTHROPIC_BASE_URL, or run with --engine fake.")
        }
        codes::MALFORMED_INPUT => Some("The file is not a valid loom snapshot, audit log, or brief."),
        codes::IO_ERROR => Some("Check that the path exists and is writable."),
        _ => None,
    }
}

/// Print a library failure and return the exit code for it.
///
/// Exit codes: 1=graph or state error, 2=generator failure, 3=file error,
///             4=usage error (see [`exit_error`])
pub fn report_error(err: &LoomError) -> i32 {
    use loom_core::error::codes;
    print_error(&error_body(err.code(), &err.to_string(), docs_hint(err)));
    match err.code() {
        codes::GENERATOR_FAILED => 2,
        codes::IO_ERROR | codes::MALFORMED_INPUT => 3,
        _ => 1,
    }
}

/// Pretty-print a JSON document to stdout.
pub fn print_json(value: &serde_json::Value) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => exit_error(&format!("Failed to render output: {e}"), None),
    }
}

#[cfg(test)]
mod tests {
    use loom_core::error::LoomError;
    use loom_core::generator::GeneratorError;
    use serde_json::json;

    use super::{USAGE_EXIT_CODE, error_body, report_error};

    #[test]
    fn error_body_includes_hint_only_when_given() {
        assert_eq!(
            error_body("not_found", "node 'x' does not exist", None),
            json!({"error": "not_found", "message": "node 'x' does not exist"})
        );
        assert_eq!(
            error_body("io_error", "boom", Some("check the path"))["docs_hint"],
            json!("check the path")
        );
    }

    #[test]
    fn library_failures_never_use_the_usage_exit_code() {
        let cases = [
            (LoomError::NodeNotFound { id: "n1".into() }, 1),
            (LoomError::EmptyPath, 1),
            (
                LoomError::Generator(GeneratorError::Http("refused".into())),
                2,
            ),
            (LoomError::MalformedSnapshot("bad".into()), 3),
        ];
        for (err, expected) in cases {
            let code = report_error(&err);
            assert_eq!(code, expected);
            assert_ne!(code, USAGE_EXIT_CODE);
        }
    }
}
