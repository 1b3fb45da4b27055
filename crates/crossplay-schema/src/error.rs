use crossplay_protocol_core::{CodecError, ConnectionState};
use crossplay_registry::{RegistryError, RegistryKey};
use crossplay_types::{Direction, ProtocolVersion};
use thiserror::Error;

/// Errors raised while decoding or encoding one packet.
///
/// `field` is the dotted path of the field being processed, e.g. `action.flags`.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("unknown variant {tag} for `{field}`")]
    UnknownVariant { field: String, tag: i64 },
    #[error("failed to decode `{field}`: {source}")]
    FieldDecode { field: String, source: CodecError },
    #[error("`{field}`: raw id {raw_id} of {registry} has no counterpart in the target revision")]
    UnresolvedIdentifier {
        field: String,
        registry: RegistryKey,
        raw_id: i32,
    },
    #[error("{remaining} unread bytes after decoding {kind}")]
    StreamFraming { kind: String, remaining: usize },
    #[error("`{field}`: registry lookup failed: {source}")]
    Registry { field: String, source: RegistryError },
    #[error("no value for `{field}`")]
    MissingField { field: String },
    #[error("`{field}`: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("`{field}`: {value} does not fit in {ty}")]
    OutOfRange {
        field: String,
        value: i64,
        ty: &'static str,
    },
    #[error("`{field}`: variant {variant} does not exist in protocol {version}")]
    UnsupportedVariant {
        field: String,
        variant: &'static str,
        version: ProtocolVersion,
    },
}

pub type TranslateResult<T> = Result<T, TranslateError>;

fn join(parent: &str, field: &str) -> String {
    if field.is_empty() {
        parent.to_string()
    } else if field.starts_with('[') {
        format!("{}{}", parent, field)
    } else {
        format!("{}.{}", parent, field)
    }
}

impl TranslateError {
    /// Prefix the field path with the enclosing field's name.
    pub fn within(self, parent: &str) -> Self {
        match self {
            TranslateError::UnknownVariant { field, tag } => TranslateError::UnknownVariant {
                field: join(parent, &field),
                tag,
            },
            TranslateError::FieldDecode { field, source } => TranslateError::FieldDecode {
                field: join(parent, &field),
                source,
            },
            TranslateError::UnresolvedIdentifier {
                field,
                registry,
                raw_id,
            } => TranslateError::UnresolvedIdentifier {
                field: join(parent, &field),
                registry,
                raw_id,
            },
            TranslateError::Registry { field, source } => TranslateError::Registry {
                field: join(parent, &field),
                source,
            },
            TranslateError::MissingField { field } => TranslateError::MissingField {
                field: join(parent, &field),
            },
            TranslateError::TypeMismatch {
                field,
                expected,
                found,
            } => TranslateError::TypeMismatch {
                field: join(parent, &field),
                expected,
                found,
            },
            TranslateError::OutOfRange { field, value, ty } => TranslateError::OutOfRange {
                field: join(parent, &field),
                value,
                ty,
            },
            TranslateError::UnsupportedVariant {
                field,
                variant,
                version,
            } => TranslateError::UnsupportedVariant {
                field: join(parent, &field),
                variant,
                version,
            },
            other => other,
        }
    }
}

impl From<CodecError> for TranslateError {
    fn from(source: CodecError) -> Self {
        TranslateError::FieldDecode {
            field: String::new(),
            source,
        }
    }
}

impl From<RegistryError> for TranslateError {
    fn from(source: RegistryError) -> Self {
        TranslateError::Registry {
            field: String::new(),
            source,
        }
    }
}

/// Schema configuration errors, detected when the catalog is built. Fatal at startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{packet}: field `{field}` is declared more than once for protocol {version}")]
    DuplicateField {
        packet: &'static str,
        field: String,
        version: ProtocolVersion,
    },
    #[error("{packet}: field `{field}` has no value source when translating {from} -> {to}")]
    NoValueSource {
        packet: &'static str,
        field: String,
        from: ProtocolVersion,
        to: ProtocolVersion,
    },
    #[error("{packet}: computation of `{field}` reads `{argument}`, which is not decoded before it in protocol {version}")]
    UnknownArgument {
        packet: &'static str,
        field: String,
        argument: &'static str,
        version: ProtocolVersion,
    },
    #[error("{packet}: discriminant {tag} of `{field}` is used twice in protocol {version}")]
    DuplicateTag {
        packet: &'static str,
        field: String,
        tag: i32,
        version: ProtocolVersion,
    },
    #[error("{packet}: discriminant of `{field}` is not an integer type")]
    NonIntegerTag { packet: &'static str, field: String },
    #[error("{state}/{direction} packet id {id:#04x} in protocol {version} is used by both {first} and {second}")]
    DuplicatePacketId {
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
        first: &'static str,
        second: &'static str,
    },
    #[error("{state}/{direction} packet {kind} is declared twice")]
    DuplicateKind {
        state: ConnectionState,
        direction: Direction,
        kind: &'static str,
    },
    #[error("{packet}: packet id windows overlap")]
    OverlappingIds { packet: &'static str },
    #[error("{packet}: `{field}` cannot be computed for {to}, `{argument}` is missing when translating from {from}")]
    Unsatisfiable {
        packet: &'static str,
        field: String,
        argument: &'static str,
        from: ProtocolVersion,
        to: ProtocolVersion,
    },
    #[error("{packet}: variant {variant} of `{field}` exists in {from} but not in {to}")]
    MissingVariant {
        packet: &'static str,
        field: String,
        variant: &'static str,
        from: ProtocolVersion,
        to: ProtocolVersion,
    },
    #[error("{packet}: `{field}` changes to an incompatible type between {from} and {to}")]
    IncompatibleTypes {
        packet: &'static str,
        field: String,
        from: ProtocolVersion,
        to: ProtocolVersion,
    },
}
