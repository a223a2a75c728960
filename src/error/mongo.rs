use mongodb::error::{ErrorKind, WriteFailure};
use serde::{Deserialize, Serialize};

use super::kinds::CatalogError;

/// Duplicate key on insert/update.
const DUPLICATE_KEY_CODES: [i32; 2] = [11000, 11001];

/// Server-side codes that mean "your write broke a constraint".
const CONSTRAINT_CODES: [i32; 3] = [
    85,  // IndexOptionsConflict
    86,  // IndexKeySpecsConflict
    121, // DocumentValidationFailure
];

/// Server-side codes that mean "the server cannot serve you right now".
const UNAVAILABLE_CODES: [i32; 7] = [
    6,    // HostUnreachable
    7,    // HostNotFound
    89,   // NetworkTimeout
    91,   // ShutdownInProgress
    189,  // PrimarySteppedDown
    9001, // SocketException
    11600, // InterruptedAtShutdown
];

/// Structured error information extracted from MongoDB errors.
///
/// Serialized to JSON when a driver error is logged.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) key: Option<bson::Document>,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Map a driver error onto the catalog error taxonomy.
///
/// Uses the driver's typed error kinds rather than message parsing:
/// transport and server-selection failures become `StoreUnavailable`,
/// duplicate keys and index conflicts become `Validation`, everything else
/// is carried through as `Store`.
pub fn classify(error: mongodb::error::Error) -> CatalogError {
    let info = extract_error_info(&error);

    match error.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => {
            return CatalogError::StoreUnavailable(error.to_string());
        }
        _ => {}
    }

    match info.code {
        Some(code) if DUPLICATE_KEY_CODES.contains(&code) => {
            let key = info
                .key
                .as_ref()
                .map(|k| format!(" {k}"))
                .unwrap_or_default();
            CatalogError::Validation(format!("Duplicate key error{key}"))
        }
        Some(code) if CONSTRAINT_CODES.contains(&code) => CatalogError::Validation(
            info.message.unwrap_or_else(|| error.to_string()),
        ),
        Some(code) if UNAVAILABLE_CODES.contains(&code) => {
            CatalogError::StoreUnavailable(error.to_string())
        }
        _ => CatalogError::Store(error),
    }
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.key = duplicate_key(&write_error.details);
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                }
                _ => {}
            }
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("mongo.insert_many_error".to_string());

            if let Some(first_error) = insert_error
                .write_errors
                .as_ref()
                .and_then(|errors| errors.first())
            {
                info.code = Some(first_error.code);
                info.message = Some(first_error.message.clone());
                info.key = duplicate_key(&first_error.details);
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info.name = info.code.and_then(error_name).map(str::to_string);
    info
}

/// Human-readable name for the codes this crate cares about.
fn error_name(code: i32) -> Option<&'static str> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        85 => "IndexOptionsConflict",
        86 => "IndexKeySpecsConflict",
        121 => "DocumentValidationFailure",
        26 => "NamespaceNotFound",
        _ => return None,
    };

    Some(name)
}

/// The offending key of a duplicate-key write error, when the server reports it.
fn duplicate_key(details: &Option<bson::Document>) -> Option<bson::Document> {
    let doc = details.as_ref()?;
    doc.get_document("keyValue")
        .or_else(|_| doc.get_document("keyPattern"))
        .ok()
        .cloned()
}
