use colored::*;
use grpcui_proxy_core::{
    ErrorKind, Session, SessionError,
    dial::DialError,
    prost_reflect::{FileDescriptor, MethodDescriptor},
};
use serde_json::json;

/// A wrapper struct for a formatted, colored string.
///
/// Implements `Display` so it can be printed directly.
pub struct FormattedString(pub String);

/// The methods of a session, grouped by service.
pub struct MethodList<'a>(pub &'a [MethodDescriptor]);

pub struct FileList<'a>(pub &'a [FileDescriptor]);

impl std::fmt::Display for FormattedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", self.0)?;
        Ok(())
    }
}

impl From<serde_json::Value> for FormattedString {
    fn from(value: serde_json::Value) -> Self {
        FormattedString(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<&MethodDescriptor> for FormattedString {
    fn from(method: &MethodDescriptor) -> Self {
        let input_stream = if method.is_client_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };
        let output_stream = if method.is_server_streaming() {
            format!("{} ", "stream".cyan())
        } else {
            "".to_string()
        };

        FormattedString(format!(
            "{} {}({}{}) {} ({}{});",
            "rpc".cyan(),
            method.name().green(),
            input_stream,
            method.input().full_name().yellow(),
            "returns".cyan(),
            output_stream,
            method.output().full_name().yellow()
        ))
    }
}

impl From<MethodList<'_>> for FormattedString {
    fn from(MethodList(methods): MethodList<'_>) -> Self {
        if methods.is_empty() {
            return FormattedString("No methods selected.".yellow().to_string());
        }

        let mut out = String::new();
        let mut current_service: Option<String> = None;

        for method in methods {
            let service = method.parent_service();

            if current_service.as_deref() != Some(service.full_name()) {
                if current_service.is_some() {
                    out.push_str("}\n\n");
                }
                out.push_str(&format!(
                    "{} {} {{\n",
                    "service".cyan(),
                    service.full_name().green()
                ));
                current_service = Some(service.full_name().to_string());
            }

            out.push_str("  ");
            out.push_str(&FormattedString::from(method).0);
            out.push('\n');
        }
        out.push('}');
        FormattedString(out)
    }
}

impl From<FileList<'_>> for FormattedString {
    fn from(FileList(files): FileList<'_>) -> Self {
        let mut out = String::new();
        out.push_str("Files:\n");
        for file in files {
            out.push_str(&format!("  - {}\n", file.name().green()));
        }
        FormattedString(out.trim_end().to_string())
    }
}

impl From<&Session> for FormattedString {
    fn from(session: &Session) -> Self {
        FormattedString(format!(
            "{} {}\n\n{}",
            "Connected to".green().bold(),
            session.endpoint(),
            FormattedString::from(MethodList(session.methods())).0
        ))
    }
}

impl From<&anyhow::Error> for FormattedString {
    fn from(err: &anyhow::Error) -> Self {
        let title = match err.downcast_ref::<SessionError>().map(SessionError::kind) {
            Some(ErrorKind::Connection) => "Connection Error:",
            Some(ErrorKind::Protocol) => "Protocol Error:",
            Some(ErrorKind::Selection) => "Selection Error:",
            Some(ErrorKind::Reflection) => "Reflection Error:",
            None if err.downcast_ref::<DialError>().is_some() => "Connection Error:",
            None => "Error:",
        };

        FormattedString(format!("{}\n\n'{:#}'", title.red().bold(), err))
    }
}

/// A machine readable summary of a session.
pub fn session_json(session: &Session, with_files: bool) -> serde_json::Value {
    let methods: Vec<_> = session
        .methods()
        .iter()
        .map(|method| {
            json!({
                "service": method.parent_service().full_name(),
                "method": method.name(),
                "input": method.input().full_name(),
                "output": method.output().full_name(),
                "client_streaming": method.is_client_streaming(),
                "server_streaming": method.is_server_streaming(),
            })
        })
        .collect();

    let mut summary = json!({
        "endpoint": session.endpoint(),
        "methods": methods,
    });

    if with_files {
        summary["files"] = session.files().iter().map(|f| f.name()).collect();
    }

    summary
}
