//! User-facing notifications. The daemon has no window; outcome
//! feedback arrives through system notifications.

use tracing::warn;

pub trait Notifier: Send + Sync {
    fn notify_success(&self, message: &str, subtitle: Option<&str>);
    fn notify_error(&self, message: &str, recovery: Option<&str>);
}

/// Posts notifications through `osascript` so the daemon needs no app
/// bundle or notification entitlement.
#[derive(Debug, Default)]
pub struct SystemNotifier;

impl Notifier for SystemNotifier {
    fn notify_success(&self, message: &str, subtitle: Option<&str>) {
        post(message, "Rephraser", subtitle);
    }

    fn notify_error(&self, message: &str, recovery: Option<&str>) {
        post(message, "Rephraser Error", recovery);
    }
}

#[cfg(target_os = "macos")]
fn post(message: &str, title: &str, subtitle: Option<&str>) {
    let mut script = format!(
        r#"display notification "{}" with title "{}""#,
        escape(message),
        escape(title)
    );
    if let Some(subtitle) = subtitle {
        script.push_str(&format!(r#" subtitle "{}""#, escape(subtitle)));
    }

    let result = std::process::Command::new("osascript")
        .args(["-e", &script])
        .output();

    match result {
        Ok(output) if !output.status.success() => {
            warn!(
                status = %output.status,
                "osascript notification exited with an error"
            );
        }
        Err(error) => {
            warn!(%error, "failed to run osascript for notification");
        }
        _ => {}
    }
}

#[cfg(not(target_os = "macos"))]
fn post(message: &str, title: &str, subtitle: Option<&str>) {
    let _ = subtitle;
    warn!(%title, %message, "system notifications are only available on macOS");
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_quotes_and_backslashes() {
        assert_eq!(escape(r#"say "hi" \now"#), r#"say \"hi\" \\now"#);
    }
}
