use crate::error::{SchemaError, TranslateResult};
use crate::schema::{decoded_names, FieldDescriptor, FieldType, PacketSchema, VariantGroup};
use crate::value::Record;
use bytes::{Buf, BytesMut};
use crossplay_protocol_core::ConnectionState;
use crossplay_registry::IdTranslator;
use crossplay_types::{Direction, ProtocolVersion};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

type PacketKey = (ConnectionState, Direction, ProtocolVersion, i32);

/// Every packet schema the process knows, validated for a fixed set of protocol versions.
#[derive(Debug)]
pub struct SchemaCatalog {
    versions: Vec<ProtocolVersion>,
    packets: Vec<PacketSchema>,
    by_id: HashMap<PacketKey, usize>,
    by_kind: HashMap<(ConnectionState, Direction), HashMap<&'static str, usize>>,
}

pub struct CatalogBuilder {
    versions: Vec<ProtocolVersion>,
    packets: Vec<PacketSchema>,
}

impl SchemaCatalog {
    pub fn builder(versions: &[ProtocolVersion]) -> CatalogBuilder {
        let mut versions = versions.to_vec();
        versions.sort();
        versions.dedup();
        CatalogBuilder {
            versions,
            packets: Vec::new(),
        }
    }

    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(&version)
    }

    pub fn packets(&self) -> impl Iterator<Item = &PacketSchema> {
        self.packets.iter()
    }

    pub fn lookup(
        &self,
        state: ConnectionState,
        direction: Direction,
        version: ProtocolVersion,
        id: i32,
    ) -> Option<&PacketSchema> {
        self.by_id
            .get(&(state, direction, version, id))
            .map(|&i| &self.packets[i])
    }

    pub fn get(
        &self,
        state: ConnectionState,
        direction: Direction,
        kind: &str,
    ) -> Option<&PacketSchema> {
        self.by_kind
            .get(&(state, direction))?
            .get(kind)
            .map(|&i| &self.packets[i])
    }

    /// Decode the payload of `kind` written for `version`.
    pub fn decode(
        &self,
        state: ConnectionState,
        direction: Direction,
        kind: &str,
        buf: &mut impl Buf,
        version: ProtocolVersion,
        ids: &dyn IdTranslator,
    ) -> Option<TranslateResult<Record>> {
        self.get(state, direction, kind)
            .map(|schema| schema.decode(buf, version, ids))
    }

    /// Encode a packet of `kind` for `version` into a frame body (packet ID then payload).
    /// `None` if the kind does not exist in that version.
    pub fn encode(
        &self,
        state: ConnectionState,
        direction: Direction,
        kind: &str,
        record: &Record,
        version: ProtocolVersion,
    ) -> Option<TranslateResult<BytesMut>> {
        let schema = self.get(state, direction, kind)?;
        let id = schema.id_for(version)?;
        let mut out = BytesMut::new();
        crossplay_protocol_core::write_varint(&mut out, id);
        Some(schema.encode(record, version, &mut out).map(|_| out))
    }

    /// Write the packet ID table of every supported version to
    /// `<root>/<protocol>/packets_<direction>.txt`, one `id state kind` line per packet.
    pub fn dump(&self, root: &Path) -> io::Result<()> {
        for &version in &self.versions {
            let dir = root.join(version.number().to_string());
            fs::create_dir_all(&dir)?;
            for direction in [Direction::Clientbound, Direction::Serverbound] {
                let mut rows: Vec<(u8, i32, ConnectionState, &str)> = self
                    .packets
                    .iter()
                    .filter(|p| p.direction == direction)
                    .filter_map(|p| {
                        p.id_for(version)
                            .map(|id| (p.state.as_u8(), id, p.state, p.kind))
                    })
                    .collect();
                rows.sort_by_key(|&(order, id, _, _)| (order, id));
                let path = dir.join(format!("packets_{}.txt", direction));
                let mut out = BufWriter::new(fs::File::create(&path)?);
                writeln!(out, "id state kind")?;
                for (_, id, state, kind) in rows {
                    writeln!(out, "{:#04x} {} {}", id, state, kind)?;
                }
                out.flush()?;
            }
        }
        info!(
            "Dumped packet ids for {} protocols to {}",
            self.versions.len(),
            root.display()
        );
        Ok(())
    }
}

impl CatalogBuilder {
    pub fn packet(mut self, schema: PacketSchema) -> Self {
        self.packets.push(schema);
        self
    }

    pub fn packets(mut self, schemas: impl IntoIterator<Item = PacketSchema>) -> Self {
        self.packets.extend(schemas);
        self
    }

    /// Index and validate every packet for every version and ordered version pair.
    pub fn build(self) -> Result<SchemaCatalog, SchemaError> {
        let mut by_id: HashMap<PacketKey, usize> = HashMap::new();
        let mut by_kind: HashMap<(ConnectionState, Direction), HashMap<&'static str, usize>> =
            HashMap::new();

        for (index, packet) in self.packets.iter().enumerate() {
            if by_kind
                .entry((packet.state, packet.direction))
                .or_default()
                .insert(packet.kind, index)
                .is_some()
            {
                return Err(SchemaError::DuplicateKind {
                    state: packet.state,
                    direction: packet.direction,
                    kind: packet.kind,
                });
            }
            for (i, (a, _)) in packet.ids.iter().enumerate() {
                if packet.ids[i + 1..].iter().any(|(b, _)| a.overlaps(b)) {
                    return Err(SchemaError::OverlappingIds {
                        packet: packet.kind,
                    });
                }
            }

            for &version in &self.versions {
                let Some(id) = packet.id_for(version) else {
                    continue;
                };
                let key = (packet.state, packet.direction, version, id);
                if let Some(&other) = by_id.get(&key) {
                    return Err(SchemaError::DuplicatePacketId {
                        state: packet.state,
                        direction: packet.direction,
                        version,
                        id,
                        first: self.packets[other].kind,
                        second: packet.kind,
                    });
                }
                by_id.insert(key, index);
                let layout: Vec<&FieldDescriptor> = packet.fields.iter().collect();
                check_layout(packet.kind, "", &layout, version)?;
            }

            for &from in &self.versions {
                for &to in &self.versions {
                    if from == to || !packet.exists_in(from) || !packet.exists_in(to) {
                        continue;
                    }
                    let source: Vec<&FieldDescriptor> = packet.fields.iter().collect();
                    let pair = Pair {
                        packet: packet.kind,
                        from,
                        to,
                    };
                    pair.check_fields("", &source, &source)?;
                }
            }
            debug!(
                "Validated {}/{} {} ({} fields)",
                packet.state,
                packet.direction,
                packet.kind,
                packet.fields.len()
            );
        }

        info!(
            "Loaded {} packet schemas for protocols {:?}",
            self.packets.len(),
            self.versions.iter().map(|v| v.number()).collect::<Vec<_>>()
        );
        Ok(SchemaCatalog {
            versions: self.versions,
            packets: self.packets,
            by_id,
            by_kind,
        })
    }
}

fn path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Checks that hold within one version: unique names, computation arguments decoded
/// before use, well-formed variant groups.
fn check_layout(
    packet: &'static str,
    parent: &str,
    fields: &[&FieldDescriptor],
    version: ProtocolVersion,
) -> Result<(), SchemaError> {
    let mut seen: Vec<&str> = Vec::new();
    for field in fields.iter().filter(|f| f.present(version)) {
        if seen.contains(&field.name) {
            return Err(SchemaError::DuplicateField {
                packet,
                field: path(parent, field.name),
                version,
            });
        }
        seen.push(field.name);
    }

    // Wire fields are all read before any computation runs, so an argument may only
    // name a field computed earlier in declaration order.
    for (position, field) in fields.iter().enumerate() {
        if !field.computed(version) {
            continue;
        }
        let Some(introduce) = &field.introduce else {
            continue;
        };
        for &arg in introduce.args {
            let declared = fields.iter().any(|f| f.name == arg);
            let forward = fields.iter().enumerate().any(|(i, f)| {
                f.name == arg && i >= position && f.computed(version) && !f.on_wire(version)
            });
            if !declared || forward {
                return Err(SchemaError::UnknownArgument {
                    packet,
                    field: path(parent, field.name),
                    argument: arg,
                    version,
                });
            }
        }
    }

    for field in fields.iter().filter(|f| f.on_wire(version)) {
        check_type(packet, &path(parent, field.name), &field.ty, version)?;
    }
    Ok(())
}

fn check_type(
    packet: &'static str,
    at: &str,
    ty: &FieldType,
    version: ProtocolVersion,
) -> Result<(), SchemaError> {
    match ty {
        FieldType::Optional(inner) | FieldType::List(inner) => {
            check_type(packet, at, inner, version)
        }
        FieldType::Record(fields) => {
            let layout: Vec<&FieldDescriptor> = fields.iter().collect();
            check_layout(packet, at, &layout, version)
        }
        FieldType::Variant(group) => check_group(packet, at, group, version),
        _ => Ok(()),
    }
}

fn check_group(
    packet: &'static str,
    at: &str,
    group: &VariantGroup,
    version: ProtocolVersion,
) -> Result<(), SchemaError> {
    if !group.tag.is_integer() {
        return Err(SchemaError::NonIntegerTag {
            packet,
            field: at.to_string(),
        });
    }
    let mut tags = Vec::new();
    for variant in group.active(version) {
        if tags.contains(&variant.tag) {
            return Err(SchemaError::DuplicateTag {
                packet,
                field: at.to_string(),
                tag: variant.tag,
                version,
            });
        }
        tags.push(variant.tag);
        check_layout(packet, &path(at, variant.name), &group.layout(variant), version)?;
    }
    Ok(())
}

/// Checks for translating a packet decoded under `from` into the layout of `to`.
struct Pair {
    packet: &'static str,
    from: ProtocolVersion,
    to: ProtocolVersion,
}

impl Pair {
    fn check_fields(
        &self,
        parent: &str,
        source: &[&FieldDescriptor],
        target: &[&FieldDescriptor],
    ) -> Result<(), SchemaError> {
        let decoded = decoded_names(source, self.from);
        let mut computed: Vec<&str> = Vec::new();

        for field in target.iter().filter(|f| f.on_wire(self.to)) {
            let at = path(parent, field.name);
            if decoded.contains(&field.name) {
                let from = source
                    .iter()
                    .find(|f| f.name == field.name && f.present(self.from));
                if let Some(from) = from {
                    self.check_type(&at, &from.ty, &field.ty)?;
                }
                continue;
            }
            let Some(introduce) = &field.introduce else {
                return Err(SchemaError::NoValueSource {
                    packet: self.packet,
                    field: at,
                    from: self.from,
                    to: self.to,
                });
            };
            for &arg in introduce.args {
                if !decoded.contains(&arg) && !computed.contains(&arg) {
                    return Err(SchemaError::Unsatisfiable {
                        packet: self.packet,
                        field: at,
                        argument: arg,
                        from: self.from,
                        to: self.to,
                    });
                }
            }
            computed.push(field.name);
        }
        Ok(())
    }

    fn check_type(&self, at: &str, from: &FieldType, to: &FieldType) -> Result<(), SchemaError> {
        if !from.compatible(to) {
            return Err(SchemaError::IncompatibleTypes {
                packet: self.packet,
                field: at.to_string(),
                from: self.from,
                to: self.to,
            });
        }
        match (from, to) {
            (FieldType::Optional(a), FieldType::Optional(b))
            | (FieldType::List(a), FieldType::List(b)) => self.check_type(at, a, b),
            (FieldType::Record(a), FieldType::Record(b)) => {
                let a: Vec<&FieldDescriptor> = a.iter().collect();
                let b: Vec<&FieldDescriptor> = b.iter().collect();
                self.check_fields(at, &a, &b)
            }
            (FieldType::Variant(a), FieldType::Variant(b)) => {
                for variant in a.active(self.from) {
                    let Some(target) = b.variant_by_name(variant.name, self.to) else {
                        return Err(SchemaError::MissingVariant {
                            packet: self.packet,
                            field: at.to_string(),
                            variant: variant.name,
                            from: self.from,
                            to: self.to,
                        });
                    };
                    self.check_fields(
                        &path(at, variant.name),
                        &a.layout(variant),
                        &b.layout(target),
                    )?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
