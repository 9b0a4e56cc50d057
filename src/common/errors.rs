use anyhow::Error;
use log::error;

/// Log an error together with its whole context chain and hand it back.
pub fn handle_error(error: Error) -> Error {
    let mut message = format!("{}", error);
    for cause in error.chain().skip(1) {
        message.push_str(&format!("\n  caused by: {}", cause));
    }
    error!("{}", message);
    error
}
