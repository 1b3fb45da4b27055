//! Schema-driven decode and encode.
//!
//! Decoding reads the wire fields a version carries, then runs introduced computations in
//! declaration order, and stores remappable IDs already translated to the target numbering.
//! Encoding walks the target version's layout, filling fields that the source lacked from
//! their computations.

use crate::error::{TranslateError, TranslateResult};
use crate::schema::{FieldDescriptor, FieldType, IdField, VariantGroup};
use crate::value::{Record, Value};
use bytes::{Buf, BufMut};
use crossplay_protocol_core::codec::{self, CodecError};
use crossplay_registry::{IdTranslator, Remapped};
use crossplay_types::ProtocolVersion;
use tracing::trace;

pub fn decode_fields(
    buf: &mut impl Buf,
    fields: &[&FieldDescriptor],
    version: ProtocolVersion,
    ids: &dyn IdTranslator,
) -> TranslateResult<Record> {
    let mut scratch = Record::new();
    for field in fields.iter().filter(|f| f.on_wire(version)) {
        let value = read_value(buf, &field.ty, version, ids).map_err(|e| e.within(field.name))?;
        scratch.set(field.name, value);
    }

    for field in fields.iter().filter(|f| f.computed(version)) {
        let Some(introduce) = field.introduce else {
            continue;
        };
        let args = introduce
            .args
            .iter()
            .map(|arg| scratch.get(arg))
            .collect::<Option<Vec<&Value>>>();
        let value = match args {
            Some(args) => introduce.apply(&args),
            None => {
                trace!("Not computing {} for protocol {}", field.name, version);
                continue;
            }
        };
        scratch.set(field.name, value);
    }

    let mut record = Record::new();
    for field in fields {
        if record.contains(field.name) {
            continue;
        }
        if let Some(value) = scratch.take(field.name) {
            record.set(field.name, value);
        }
    }
    Ok(record)
}

pub fn encode_fields(
    record: &Record,
    fields: &[&FieldDescriptor],
    version: ProtocolVersion,
    out: &mut impl BufMut,
) -> TranslateResult<()> {
    let mut computed = Record::new();
    for field in fields.iter().filter(|f| f.on_wire(version)) {
        if let Some(value) = record.get(field.name) {
            write_value(out, &field.ty, value, version).map_err(|e| e.within(field.name))?;
            continue;
        }
        let Some(introduce) = field.introduce else {
            return Err(TranslateError::MissingField {
                field: field.name.to_string(),
            });
        };
        let value = {
            let args = introduce
                .args
                .iter()
                .map(|arg| {
                    record
                        .get(arg)
                        .or_else(|| computed.get(arg))
                        .ok_or_else(|| TranslateError::MissingField {
                            field: arg.to_string(),
                        })
                })
                .collect::<TranslateResult<Vec<&Value>>>()
                .map_err(|e| e.within(field.name))?;
            introduce.apply(&args)
        };
        trace!("Computed {} for protocol {}", field.name, version);
        write_value(out, &field.ty, &value, version).map_err(|e| e.within(field.name))?;
        computed.set(field.name, value);
    }
    Ok(())
}

fn read_value(
    buf: &mut impl Buf,
    ty: &FieldType,
    version: ProtocolVersion,
    ids: &dyn IdTranslator,
) -> TranslateResult<Value> {
    let value = match ty {
        FieldType::Bool => Value::Bool(codec::read_bool(buf)?),
        FieldType::Byte => Value::Int(codec::read_i8(buf)? as i64),
        FieldType::UnsignedByte => Value::Int(codec::read_u8(buf)? as i64),
        FieldType::Short => Value::Int(codec::read_i16(buf)? as i64),
        FieldType::UnsignedShort => Value::Int(codec::read_u16(buf)? as i64),
        FieldType::Int => Value::Int(codec::read_i32(buf)? as i64),
        FieldType::Long => Value::Int(codec::read_i64(buf)?),
        FieldType::VarInt => Value::Int(codec::read_varint(buf)? as i64),
        FieldType::VarLong => Value::Int(codec::read_varlong(buf)?),
        FieldType::Float => Value::Float(codec::read_f32(buf)? as f64),
        FieldType::Double => Value::Float(codec::read_f64(buf)?),
        FieldType::String { max_len } => Value::String(codec::read_string(buf, *max_len)?),
        FieldType::Uuid => Value::Uuid(codec::read_uuid(buf)?),
        FieldType::Position => Value::Position(codec::read_position(buf)?),
        FieldType::ByteArray => Value::Bytes(codec::read_byte_array(buf)?),
        FieldType::Remaining => Value::Bytes(buf.copy_to_bytes(buf.remaining()).to_vec()),
        FieldType::Id(id) => Value::Int(read_id(buf, id, ids)? as i64),
        FieldType::Optional(inner) => {
            if codec::read_bool(buf)? {
                Value::Optional(Some(Box::new(read_value(buf, inner, version, ids)?)))
            } else {
                Value::Optional(None)
            }
        }
        FieldType::List(inner) => {
            let len = codec::read_list_len(buf)?;
            // Every element takes at least one byte.
            if len > buf.remaining() {
                return Err(CodecError::NotEnoughData {
                    needed: len,
                    remaining: buf.remaining(),
                }
                .into());
            }
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let item = read_value(buf, inner, version, ids)
                    .map_err(|e| e.within(&format!("[{}]", i)))?;
                items.push(item);
            }
            Value::List(items)
        }
        FieldType::Record(fields) => {
            let layout: Vec<&FieldDescriptor> = fields.iter().collect();
            Value::Record(decode_fields(buf, &layout, version, ids)?)
        }
        FieldType::Variant(group) => read_variant(buf, group, version, ids)?,
    };
    Ok(value)
}

fn read_id(buf: &mut impl Buf, id: &IdField, ids: &dyn IdTranslator) -> TranslateResult<i32> {
    let raw_id = codec::read_varint(buf)?;
    match ids.translate(&id.registry, raw_id)? {
        Remapped::Known(target) => Ok(target as i32),
        Remapped::Unknown => match id.fallback {
            Some(fallback) => {
                trace!(
                    "No counterpart for {} raw id {}, using {}",
                    id.registry,
                    raw_id,
                    fallback
                );
                Ok(fallback)
            }
            None => Err(TranslateError::UnresolvedIdentifier {
                field: String::new(),
                registry: id.registry.clone(),
                raw_id,
            }),
        },
    }
}

fn read_variant(
    buf: &mut impl Buf,
    group: &VariantGroup,
    version: ProtocolVersion,
    ids: &dyn IdTranslator,
) -> TranslateResult<Value> {
    let tag = read_value(buf, &group.tag, version, ids)?;
    let tag = tag.as_int().ok_or(TranslateError::TypeMismatch {
        field: String::new(),
        expected: "integer",
        found: tag.type_name(),
    })?;
    let variant = group
        .resolve(tag, version)
        .ok_or(TranslateError::UnknownVariant {
            field: String::new(),
            tag,
        })?;
    let fields = decode_fields(buf, &group.layout(variant), version, ids)?;
    Ok(Value::Variant {
        name: variant.name,
        fields,
    })
}

fn mismatch(expected: &FieldType, found: &Value) -> TranslateError {
    TranslateError::TypeMismatch {
        field: String::new(),
        expected: expected.name(),
        found: found.type_name(),
    }
}

fn ranged(ty: &FieldType, value: i64, min: i64, max: i64) -> TranslateResult<i64> {
    if value < min || value > max {
        return Err(TranslateError::OutOfRange {
            field: String::new(),
            value,
            ty: ty.name(),
        });
    }
    Ok(value)
}

fn write_int(out: &mut impl BufMut, ty: &FieldType, value: i64) -> TranslateResult<()> {
    match ty {
        FieldType::Byte => out.put_i8(ranged(ty, value, i8::MIN as i64, i8::MAX as i64)? as i8),
        FieldType::UnsignedByte => out.put_u8(ranged(ty, value, 0, u8::MAX as i64)? as u8),
        FieldType::Short => out.put_i16(ranged(ty, value, i16::MIN as i64, i16::MAX as i64)? as i16),
        FieldType::UnsignedShort => out.put_u16(ranged(ty, value, 0, u16::MAX as i64)? as u16),
        FieldType::Int => out.put_i32(ranged(ty, value, i32::MIN as i64, i32::MAX as i64)? as i32),
        FieldType::Long => out.put_i64(value),
        FieldType::VarInt => codec::write_varint(
            out,
            ranged(ty, value, i32::MIN as i64, i32::MAX as i64)? as i32,
        ),
        FieldType::VarLong => codec::write_varlong(out, value),
        FieldType::Id(_) => codec::write_varint(out, ranged(ty, value, 0, i32::MAX as i64)? as i32),
        other => return Err(mismatch(other, &Value::Int(value))),
    }
    Ok(())
}

fn write_value(
    out: &mut impl BufMut,
    ty: &FieldType,
    value: &Value,
    version: ProtocolVersion,
) -> TranslateResult<()> {
    match (ty, value) {
        (FieldType::Bool, Value::Bool(b)) => out.put_u8(*b as u8),
        (ty, Value::Int(v)) if ty.is_integer() || matches!(ty, FieldType::Id(_)) => {
            write_int(out, ty, *v)?
        }
        (FieldType::Float, Value::Float(v)) => out.put_f32(*v as f32),
        (FieldType::Double, Value::Float(v)) => out.put_f64(*v),
        (FieldType::String { max_len }, Value::String(s)) => {
            let len = s.chars().count();
            if len > *max_len {
                return Err(TranslateError::OutOfRange {
                    field: String::new(),
                    value: len as i64,
                    ty: ty.name(),
                });
            }
            codec::write_string(out, s)
        }
        (FieldType::Uuid, Value::Uuid(uuid)) => codec::write_uuid(out, uuid),
        (FieldType::Position, Value::Position(pos)) => codec::write_position(out, pos),
        (FieldType::ByteArray, Value::Bytes(bytes)) => codec::write_byte_array(out, bytes),
        (FieldType::Remaining, Value::Bytes(bytes)) => out.put_slice(bytes),
        (FieldType::Optional(inner), Value::Optional(opt)) => match opt {
            Some(v) => {
                out.put_u8(1);
                write_value(out, inner, v, version)?;
            }
            None => out.put_u8(0),
        },
        (FieldType::List(inner), Value::List(items)) => {
            codec::write_varint(out, items.len() as i32);
            for (i, item) in items.iter().enumerate() {
                write_value(out, inner, item, version).map_err(|e| e.within(&format!("[{}]", i)))?;
            }
        }
        (FieldType::Record(fields), Value::Record(record)) => {
            let layout: Vec<&FieldDescriptor> = fields.iter().collect();
            encode_fields(record, &layout, version, out)?;
        }
        (FieldType::Variant(group), Value::Variant { name, fields }) => {
            let variant = group.variant_by_name(name, version).ok_or(
                TranslateError::UnsupportedVariant {
                    field: String::new(),
                    variant: *name,
                    version,
                },
            )?;
            write_int(out, &group.tag, variant.tag as i64)?;
            encode_fields(fields, &group.layout(variant), version, out)?;
        }
        (ty, value) => return Err(mismatch(ty, value)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{field, Variant};
    use bytes::{Bytes, BytesMut};
    use crossplay_registry::{
        BlockState, IdRemap, Identity, IndexedTable, RegistryKey, RemapSet,
    };
    use crossplay_types::{Identifier, VersionRange};

    const OLD: ProtocolVersion = ProtocolVersion::V1_19_4;
    const NEW: ProtocolVersion = ProtocolVersion::V1_20_2;

    fn copy_bit_1_to_2(args: &[&Value]) -> Value {
        let flags = args[0].as_int().unwrap_or(0);
        Value::Int(flags | ((flags & 2) << 1))
    }

    fn bar_fields() -> Vec<FieldDescriptor> {
        vec![field("flags", FieldType::UnsignedByte).introduced(&["flags"], copy_bit_1_to_2)]
    }

    fn decode(fields: &[FieldDescriptor], bytes: &[u8], version: ProtocolVersion) -> TranslateResult<Record> {
        let layout: Vec<&FieldDescriptor> = fields.iter().collect();
        let mut buf = Bytes::copy_from_slice(bytes);
        decode_fields(&mut buf, &layout, version, &Identity)
    }

    fn encode(fields: &[FieldDescriptor], record: &Record, version: ProtocolVersion) -> TranslateResult<Vec<u8>> {
        let layout: Vec<&FieldDescriptor> = fields.iter().collect();
        let mut out = BytesMut::new();
        encode_fields(record, &layout, version, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn test_flag_widening_rule() {
        let record = decode(&bar_fields(), &[0b0000_0010], NEW).unwrap();
        assert_eq!(record.int("flags"), Some(0b0000_0110));
        let record = decode(&bar_fields(), &[0b0000_0001], NEW).unwrap();
        assert_eq!(record.int("flags"), Some(0b0000_0001));
    }

    #[test]
    fn test_computation_runs_after_wire_fields() {
        fn sum(args: &[&Value]) -> Value {
            Value::Int(args.iter().filter_map(|v| v.as_int()).sum())
        }
        let fields = vec![
            field("a", FieldType::VarInt),
            field("total", FieldType::VarInt)
                .versions(VersionRange::since(NEW))
                .introduced(&["a", "b"], sum),
            field("b", FieldType::VarInt),
        ];
        let record = decode(&fields, &[3, 4], OLD).unwrap();
        assert_eq!(
            record.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["a", "total", "b"]
        );
        assert_eq!(record.int("total"), Some(7));

        // Missing on the old wire, computed for the new one.
        let bytes = encode(&fields, &record, NEW).unwrap();
        assert_eq!(bytes, vec![3, 7, 4]);
        let mut stripped = record.clone();
        stripped.take("total");
        assert_eq!(encode(&fields, &stripped, NEW).unwrap(), vec![3, 7, 4]);
        assert_eq!(encode(&fields, &record, OLD).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_computation_skipped_without_arguments() {
        fn copy(args: &[&Value]) -> Value {
            args[0].clone()
        }
        let fields = vec![
            field("legacy", FieldType::VarInt)
                .versions(VersionRange::since(NEW))
                .introduced(&["modern"], copy),
            field("modern", FieldType::VarInt).versions(VersionRange::since(NEW)),
            field("x", FieldType::Bool),
        ];
        let record = decode(&fields, &[1], OLD).unwrap();
        assert_eq!(record.len(), 1);
        assert!(!record.contains("legacy"));
    }

    #[test]
    fn test_unknown_discriminant() {
        let mut group = VariantGroup::new(FieldType::VarInt);
        for tag in 0..=5 {
            group = group.variant(Variant::new(tag, "action", vec![]));
        }
        let fields = vec![field("action", group.into())];
        let err = decode(&fields, &[99], NEW).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnknownVariant { ref field, tag: 99 } if field == "action"
        ));
    }

    #[test]
    fn test_variant_tags_follow_version() {
        let group = VariantGroup::new(FieldType::VarInt)
            .common(vec![field("id", FieldType::VarInt)])
            .variant(Variant::new(0, "add", vec![field("title", FieldType::string())]))
            .variant(Variant::new(1, "remove", vec![]).versions(VersionRange::until(OLD)))
            .variant(Variant::new(2, "remove", vec![]).versions(VersionRange::since(NEW)));
        let fields = vec![field("action", group.into())];

        let record = decode(&fields, &[1, 9], OLD).unwrap();
        match record.get("action") {
            Some(Value::Variant { name, fields }) => {
                assert_eq!(*name, "remove");
                assert_eq!(fields.int("id"), Some(9));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(encode(&fields, &record, NEW).unwrap(), vec![2, 9]);
    }

    #[test]
    fn test_missing_field_without_computation() {
        let fields = vec![field("a", FieldType::VarInt), field("b", FieldType::Bool)];
        let record = Record::new().with("a", 1);
        assert!(matches!(
            encode(&fields, &record, NEW),
            Err(TranslateError::MissingField { ref field }) if field == "b"
        ));
    }

    #[test]
    fn test_encode_range_and_type_checks() {
        let fields = vec![field("b", FieldType::UnsignedByte)];
        assert!(matches!(
            encode(&fields, &Record::new().with("b", 256), NEW),
            Err(TranslateError::OutOfRange { value: 256, .. })
        ));
        assert!(matches!(
            encode(&fields, &Record::new().with("b", "x"), NEW),
            Err(TranslateError::TypeMismatch { found: "string", .. })
        ));
    }

    #[test]
    fn test_field_decode_error_has_path() {
        let fields = vec![field(
            "inner",
            FieldType::Record(vec![field("flag", FieldType::Bool)]),
        )];
        match decode(&fields, &[5], NEW).unwrap_err() {
            TranslateError::FieldDecode { field, .. } => assert_eq!(field, "inner.flag"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_list_length_checked_against_buffer() {
        let fields = vec![field("items", FieldType::list(FieldType::VarInt))];
        assert!(matches!(
            decode(&fields, &[0x7f, 1], NEW),
            Err(TranslateError::FieldDecode { .. })
        ));
        let record = decode(&fields, &[2, 1, 2], NEW).unwrap();
        assert_eq!(
            record.get("items"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    fn stone_tables() -> RemapSet {
        let source = IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            ["air", "granite", "diorite", "andesite", "dirt", "stone"]
                .iter()
                .map(|n| BlockState::new(Identifier::minecraft(*n)))
                .collect(),
        )
        .unwrap();
        let target = IndexedTable::new(
            RegistryKey::BLOCK_STATE,
            ["air", "dirt", "granite"]
                .iter()
                .map(|n| BlockState::new(Identifier::minecraft(*n)))
                .collect(),
        )
        .unwrap();
        let mut set = RemapSet::new();
        set.insert(IdRemap::between(&source, &target).unwrap());
        set
    }

    #[test]
    fn test_ids_are_remapped_by_name() {
        let ids = stone_tables();
        let fields = [field("block", FieldType::id(RegistryKey::BLOCK_STATE))];
        let layout: Vec<&FieldDescriptor> = fields.iter().collect();
        let record = decode_fields(&mut Bytes::from_static(&[4]), &layout, NEW, &ids).unwrap();
        assert_eq!(record.int("block"), Some(1));
    }

    #[test]
    fn test_unresolved_identifier() {
        let ids = stone_tables();
        let strict = [field("block", FieldType::id(RegistryKey::BLOCK_STATE))];
        let layout: Vec<&FieldDescriptor> = strict.iter().collect();
        let err = decode_fields(&mut Bytes::from_static(&[5]), &layout, NEW, &ids).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::UnresolvedIdentifier { raw_id: 5, ref field, .. } if field == "block"
        ));

        let lenient = [field(
            "block",
            FieldType::best_effort_id(RegistryKey::BLOCK_STATE, 0),
        )];
        let layout: Vec<&FieldDescriptor> = lenient.iter().collect();
        let record = decode_fields(&mut Bytes::from_static(&[5]), &layout, NEW, &ids).unwrap();
        assert_eq!(record.int("block"), Some(0));
    }

    #[test]
    fn test_optional_and_remaining() {
        let fields = vec![
            field("name", FieldType::optional(FieldType::string())),
            field("data", FieldType::Remaining),
        ];
        let record = decode(&fields, &[1, 2, b'h', b'i', 9, 9], NEW).unwrap();
        assert_eq!(
            record.get("name"),
            Some(&Value::Optional(Some(Box::new(Value::from("hi")))))
        );
        assert_eq!(record.get("data"), Some(&Value::Bytes(vec![9, 9])));
        let record = decode(&fields, &[0], NEW).unwrap();
        assert_eq!(record.get("name"), Some(&Value::Optional(None)));
        assert_eq!(encode(&fields, &record, NEW).unwrap(), vec![0]);
    }
}
