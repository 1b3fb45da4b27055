use crate::engine;
use crate::error::{TranslateError, TranslateResult};
use crate::value::{Record, Value};
use bytes::{Buf, BufMut};
use crossplay_protocol_core::{ConnectionState, MAX_STRING_LEN};
use crossplay_registry::{IdTranslator, RegistryKey};
use crossplay_types::{Direction, ProtocolVersion, VersionRange};

/// Derives a field's value from already-decoded sibling values, in `args` order.
pub type Compute = fn(&[&Value]) -> Value;

/// A field whose value is computed rather than (or in addition to being) read from the wire.
///
/// The computation runs whenever the field is not on the wire for the version being
/// decoded and all of `args` were decoded. If `args` names the field itself it also runs
/// on the value read from the wire, which lets a rule normalise a raw value.
#[derive(Clone, Copy)]
pub struct Introduce {
    pub args: &'static [&'static str],
    pub compute: Compute,
}

impl Introduce {
    pub fn apply(&self, args: &[&Value]) -> Value {
        (self.compute)(args)
    }
}

impl std::fmt::Debug for Introduce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Introduce").field("args", &self.args).finish()
    }
}

/// A VarInt raw ID in the numbering of some registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdField {
    pub registry: RegistryKey,
    /// Target raw ID used when the value has no counterpart in the target revision.
    /// Without one an unresolved ID is an error.
    pub fallback: Option<i32>,
}

#[derive(Debug, Clone)]
pub enum FieldType {
    Bool,
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    Long,
    Float,
    Double,
    VarInt,
    VarLong,
    String { max_len: usize },
    Uuid,
    Position,
    /// VarInt length-prefixed bytes.
    ByteArray,
    /// Everything up to the end of the packet.
    Remaining,
    Id(IdField),
    /// Boolean presence flag followed by the value.
    Optional(Box<FieldType>),
    /// VarInt count followed by the elements.
    List(Box<FieldType>),
    Record(Vec<FieldDescriptor>),
    Variant(VariantGroup),
}

impl FieldType {
    pub fn string() -> Self {
        FieldType::String {
            max_len: MAX_STRING_LEN,
        }
    }

    pub fn id(registry: RegistryKey) -> Self {
        FieldType::Id(IdField {
            registry,
            fallback: None,
        })
    }

    /// An ID field that falls back to `fallback` instead of failing on unknown values.
    pub fn best_effort_id(registry: RegistryKey, fallback: i32) -> Self {
        FieldType::Id(IdField {
            registry,
            fallback: Some(fallback),
        })
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn list(inner: FieldType) -> Self {
        FieldType::List(Box::new(inner))
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Byte
                | FieldType::UnsignedByte
                | FieldType::Short
                | FieldType::UnsignedShort
                | FieldType::Int
                | FieldType::Long
                | FieldType::VarInt
                | FieldType::VarLong
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Byte => "byte",
            FieldType::UnsignedByte => "unsigned byte",
            FieldType::Short => "short",
            FieldType::UnsignedShort => "unsigned short",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::VarInt => "varint",
            FieldType::VarLong => "varlong",
            FieldType::String { .. } => "string",
            FieldType::Uuid => "uuid",
            FieldType::Position => "position",
            FieldType::ByteArray => "byte array",
            FieldType::Remaining => "remaining bytes",
            FieldType::Id(_) => "id",
            FieldType::Optional(_) => "optional",
            FieldType::List(_) => "list",
            FieldType::Record(_) => "record",
            FieldType::Variant(_) => "variant",
        }
    }

    /// Whether a value decoded as `self` can be encoded as `other`.
    /// Containers only compare their outer shape.
    pub(crate) fn compatible(&self, other: &FieldType) -> bool {
        match (self, other) {
            (FieldType::Id(a), FieldType::Id(b)) => a.registry == b.registry,
            (a, b) if a.is_integer() && b.is_integer() => true,
            (FieldType::Float | FieldType::Double, FieldType::Float | FieldType::Double) => true,
            (
                FieldType::ByteArray | FieldType::Remaining,
                FieldType::ByteArray | FieldType::Remaining,
            ) => true,
            (FieldType::Bool, FieldType::Bool)
            | (FieldType::String { .. }, FieldType::String { .. })
            | (FieldType::Uuid, FieldType::Uuid)
            | (FieldType::Position, FieldType::Position)
            | (FieldType::Optional(_), FieldType::Optional(_))
            | (FieldType::List(_), FieldType::List(_))
            | (FieldType::Record(_), FieldType::Record(_))
            | (FieldType::Variant(_), FieldType::Variant(_)) => true,
            _ => false,
        }
    }
}

/// One field of a packet or nested record.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub ty: FieldType,
    /// Versions in which the field is on the wire.
    pub versions: VersionRange,
    pub introduce: Option<Introduce>,
}

pub fn field(name: &'static str, ty: FieldType) -> FieldDescriptor {
    FieldDescriptor::new(name, ty)
}

impl FieldDescriptor {
    pub fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            versions: VersionRange::ALL,
            introduce: None,
        }
    }

    pub fn versions(mut self, versions: VersionRange) -> Self {
        self.versions = versions;
        self
    }

    pub fn introduced(mut self, args: &'static [&'static str], compute: Compute) -> Self {
        self.introduce = Some(Introduce { args, compute });
        self
    }

    pub fn on_wire(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(version)
    }

    /// Whether decoding under `version` runs this field's computation.
    pub fn computed(&self, version: ProtocolVersion) -> bool {
        match &self.introduce {
            Some(introduce) => !self.on_wire(version) || introduce.args.contains(&self.name),
            None => false,
        }
    }

    /// Whether the field is declared for `version`, on the wire or computed.
    pub fn present(&self, version: ProtocolVersion) -> bool {
        self.on_wire(version) || self.introduce.is_some()
    }
}

/// Names of the fields a record decoded under `version` carries. A computed field is
/// left out when one of its arguments is.
pub fn decoded_names(fields: &[&FieldDescriptor], version: ProtocolVersion) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = fields
        .iter()
        .filter(|f| f.on_wire(version))
        .map(|f| f.name)
        .collect();
    for field in fields.iter().filter(|f| f.computed(version)) {
        let Some(introduce) = &field.introduce else {
            continue;
        };
        if introduce.args.iter().all(|arg| names.contains(arg)) && !names.contains(&field.name) {
            names.push(field.name);
        }
    }
    names
}

/// One arm of a [`VariantGroup`].
#[derive(Debug, Clone)]
pub struct Variant {
    pub tag: i32,
    pub name: &'static str,
    pub versions: VersionRange,
    pub fields: Vec<FieldDescriptor>,
}

impl Variant {
    pub fn new(tag: i32, name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            tag,
            name,
            versions: VersionRange::ALL,
            fields,
        }
    }

    pub fn versions(mut self, versions: VersionRange) -> Self {
        self.versions = versions;
        self
    }
}

/// A tagged union: a discriminant selects one variant's field layout.
///
/// `common` fields are read right after the discriminant and are part of every variant.
#[derive(Debug, Clone)]
pub struct VariantGroup {
    pub tag: Box<FieldType>,
    pub common: Vec<FieldDescriptor>,
    pub variants: Vec<Variant>,
}

impl VariantGroup {
    pub fn new(tag: FieldType) -> Self {
        Self {
            tag: Box::new(tag),
            common: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn common(mut self, fields: Vec<FieldDescriptor>) -> Self {
        self.common = fields;
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn active(&self, version: ProtocolVersion) -> impl Iterator<Item = &Variant> {
        self.variants
            .iter()
            .filter(move |v| v.versions.contains(version))
    }

    /// Variant selected by a discriminant read under `version`.
    pub fn resolve(&self, tag: i64, version: ProtocolVersion) -> Option<&Variant> {
        self.active(version).find(|v| v.tag as i64 == tag)
    }

    pub fn variant_by_name(&self, name: &str, version: ProtocolVersion) -> Option<&Variant> {
        self.active(version).find(|v| v.name == name)
    }

    /// Full layout of a variant: common fields, then its own.
    pub fn layout<'a>(&'a self, variant: &'a Variant) -> Vec<&'a FieldDescriptor> {
        self.common.iter().chain(variant.fields.iter()).collect()
    }
}

impl From<VariantGroup> for FieldType {
    fn from(group: VariantGroup) -> Self {
        FieldType::Variant(group)
    }
}

/// One packet kind: where it lives, its numeric ID per version window, and its fields.
#[derive(Debug, Clone)]
pub struct PacketSchema {
    pub kind: &'static str,
    pub state: ConnectionState,
    pub direction: Direction,
    pub ids: Vec<(VersionRange, i32)>,
    pub fields: Vec<FieldDescriptor>,
}

impl PacketSchema {
    pub fn new(kind: &'static str, state: ConnectionState, direction: Direction) -> Self {
        Self {
            kind,
            state,
            direction,
            ids: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn id(mut self, versions: VersionRange, id: i32) -> Self {
        self.ids.push((versions, id));
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Packet ID in `version`, or `None` if the kind does not exist there.
    pub fn id_for(&self, version: ProtocolVersion) -> Option<i32> {
        self.ids
            .iter()
            .find(|(range, _)| range.contains(version))
            .map(|(_, id)| *id)
    }

    pub fn exists_in(&self, version: ProtocolVersion) -> bool {
        self.id_for(version).is_some()
    }

    /// Decode a packet payload (after the packet ID) written for `version`.
    /// The payload must be consumed exactly.
    pub fn decode(
        &self,
        buf: &mut impl Buf,
        version: ProtocolVersion,
        ids: &dyn IdTranslator,
    ) -> TranslateResult<Record> {
        let layout: Vec<&FieldDescriptor> = self.fields.iter().collect();
        let record = engine::decode_fields(buf, &layout, version, ids)?;
        if buf.has_remaining() {
            return Err(TranslateError::StreamFraming {
                kind: self.kind.to_string(),
                remaining: buf.remaining(),
            });
        }
        Ok(record)
    }

    /// Encode a record as the payload for `version`.
    pub fn encode(
        &self,
        record: &Record,
        version: ProtocolVersion,
        out: &mut impl BufMut,
    ) -> TranslateResult<()> {
        let layout: Vec<&FieldDescriptor> = self.fields.iter().collect();
        engine::encode_fields(record, &layout, version, out)
    }
}
