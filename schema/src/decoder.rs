//! Property decoders for flattened-serializer fields.
//!
//! A decoder is resolved once per field when a serializer is compiled and
//! then reused for every update. Lookup goes, in order, through the
//! parameterised factories keyed by base type, the per-name overrides, the
//! static type table, and finally the var-int default.

use bitstream::{BitReader, BitResult};

use crate::error::{SchemaError, SchemaResult};
use crate::quantized::QuantizedFloat;
use crate::value::PropertyValue;

/// Per-field encoding parameters carried by a field descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldEncoding {
    /// Named encoder, e.g. `coord` or `fixed64`.
    pub encoder: Option<String>,
    /// Declared bit count.
    pub bit_count: Option<i32>,
    /// Quantization flags.
    pub encode_flags: Option<i32>,
    /// Lower bound of a quantized range.
    pub low_value: Option<f32>,
    /// Upper bound of a quantized range.
    pub high_value: Option<f32>,
}

impl FieldEncoding {
    fn encoder_is(&self, name: &str) -> bool {
        self.encoder.as_deref() == Some(name)
    }

    fn scaled_bits(&self) -> Option<i32> {
        self.bit_count.filter(|&bits| bits > 0 && bits < 32)
    }
}

/// Scalar float decoders.
#[derive(Debug, Clone, PartialEq)]
pub enum FloatDecoder {
    /// Raw IEEE-754 bits.
    NoScale,
    /// Coordinate encoding.
    Coord,
    /// Var-int tick count in 1/64 s.
    SimulationTime,
    /// Four raw bits reinterpreted as a float.
    RuneTime,
    /// Fixed-point range.
    Quantized(QuantizedFloat),
}

impl FloatDecoder {
    /// Decodes one float.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> BitResult<f32> {
        match self {
            Self::NoScale => reader.read_f32(),
            Self::Coord => reader.read_coord(),
            Self::SimulationTime => Ok(reader.read_varu32()? as f32 * (1.0 / 64.0)),
            Self::RuneTime => Ok(f32::from_bits(reader.read_u32(4)?)),
            Self::Quantized(q) => q.decode(reader),
        }
    }
}

/// A resolved field decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDecoder {
    /// One bit.
    Bool,
    /// Zig-zag var-int.
    Signed,
    /// 32-bit var-int.
    Unsigned,
    /// 64-bit var-int.
    Unsigned64,
    /// Little-endian 64-bit word.
    Fixed64,
    /// Null-terminated string.
    String,
    /// Scalar float.
    Float(FloatDecoder),
    /// `count` floats sharing one element decoder.
    Vector {
        /// Element decoder.
        element: FloatDecoder,
        /// Component count: 2, 3, 4 or 6.
        count: u8,
    },
    /// Unit vector stored as two normals and a Z sign.
    VectorNormal,
    /// Three optional 20-bit angles centred on zero.
    QAnglePrecise,
    /// Three angles of the given width.
    QAngleBits(u8),
    /// Pitch and yaw of the given width; roll is zero.
    QAnglePitchYaw(u8),
    /// Three optional coordinates.
    QAngleCoord,
    /// Component presence bit.
    Component,
    /// Magazine count stored with a +1 bias.
    Ammo,
}

fn read_components(
    reader: &mut BitReader<'_>,
    out: &mut [f32],
    mut read: impl FnMut(&mut BitReader<'_>) -> BitResult<f32>,
) -> BitResult<()> {
    for slot in out.iter_mut() {
        *slot = read(reader)?;
    }
    Ok(())
}

fn read_optional_components(
    reader: &mut BitReader<'_>,
    mut read: impl FnMut(&mut BitReader<'_>) -> BitResult<f32>,
) -> BitResult<[f32; 3]> {
    let present = [reader.read_bool()?, reader.read_bool()?, reader.read_bool()?];
    let mut out = [0.0; 3];
    for (slot, has) in out.iter_mut().zip(present) {
        if has {
            *slot = read(reader)?;
        }
    }
    Ok(out)
}

impl FieldDecoder {
    /// Decodes one value.
    pub fn decode(&self, reader: &mut BitReader<'_>) -> BitResult<PropertyValue> {
        Ok(match self {
            Self::Bool => PropertyValue::Bool(reader.read_bool()?),
            Self::Signed => PropertyValue::Signed(i64::from(reader.read_vars32()?)),
            Self::Unsigned => PropertyValue::Unsigned(u64::from(reader.read_varu32()?)),
            Self::Unsigned64 => PropertyValue::Unsigned(reader.read_varu64()?),
            Self::Fixed64 => PropertyValue::Unsigned(reader.read_u64_le()?),
            Self::String => PropertyValue::String(reader.read_cstring()?),
            Self::Float(f) => PropertyValue::Float(f.decode(reader)?),
            Self::Vector { element, count } => {
                let mut buf = [0.0f32; 6];
                let n = usize::from(*count).min(buf.len());
                read_components(reader, &mut buf[..n], |r| element.decode(r))?;
                match n {
                    2 => PropertyValue::Vector2([buf[0], buf[1]]),
                    3 => PropertyValue::Vector3([buf[0], buf[1], buf[2]]),
                    4 => PropertyValue::Vector4([buf[0], buf[1], buf[2], buf[3]]),
                    _ => PropertyValue::Transform(buf),
                }
            }
            Self::VectorNormal => PropertyValue::Vector3(reader.read_3bit_normal()?),
            Self::QAnglePrecise => PropertyValue::Vector3(read_optional_components(reader, |r| {
                Ok(r.read_angle(20)? - 180.0)
            })?),
            Self::QAngleBits(bits) => {
                let mut out = [0.0; 3];
                read_components(reader, &mut out, |r| r.read_angle(*bits))?;
                PropertyValue::Vector3(out)
            }
            Self::QAnglePitchYaw(bits) => {
                let pitch = reader.read_angle(*bits)?;
                let yaw = reader.read_angle(*bits)?;
                PropertyValue::Vector3([pitch, yaw, 0.0])
            }
            Self::QAngleCoord => {
                PropertyValue::Vector3(read_optional_components(reader, |r| r.read_coord())?)
            }
            Self::Component => PropertyValue::Unsigned(reader.read_bits(1)?),
            Self::Ammo => PropertyValue::Signed(i64::from(reader.read_varu32()?) - 1),
        })
    }

    /// Returns `true` if this decoder yields unsigned integers, as container lengths must.
    #[must_use]
    pub const fn is_unsigned(&self) -> bool {
        matches!(
            self,
            Self::Unsigned | Self::Unsigned64 | Self::Fixed64 | Self::Component
        )
    }
}

fn quantized(field: &str, enc: &FieldEncoding) -> SchemaResult<FloatDecoder> {
    let Some(bits) = enc.scaled_bits() else {
        return Ok(FloatDecoder::NoScale);
    };
    QuantizedFloat::new(bits, enc.encode_flags, enc.low_value, enc.high_value)
        .map(FloatDecoder::Quantized)
        .map_err(|reason| SchemaError::InvalidQuantizedFloat {
            field: field.to_owned(),
            reason,
        })
}

fn float(field: &str, enc: &FieldEncoding) -> SchemaResult<FloatDecoder> {
    match enc.encoder.as_deref() {
        Some("coord") => Ok(FloatDecoder::Coord),
        Some("simtime") => Ok(FloatDecoder::SimulationTime),
        Some("runetime") => Ok(FloatDecoder::RuneTime),
        _ => quantized(field, enc),
    }
}

fn vector(field: &str, enc: &FieldEncoding, count: u8) -> SchemaResult<FieldDecoder> {
    if count == 3 && enc.encoder_is("normal") {
        return Ok(FieldDecoder::VectorNormal);
    }
    Ok(FieldDecoder::Vector {
        element: float(field, enc)?,
        count,
    })
}

fn angle_bits(field: &str, bits: i32) -> SchemaResult<u8> {
    u8::try_from(bits)
        .ok()
        .filter(|&b| b <= 64)
        .ok_or_else(|| SchemaError::InvalidBitCount {
            field: field.to_owned(),
            bits,
        })
}

fn qangle(field: &str, enc: &FieldEncoding) -> SchemaResult<FieldDecoder> {
    if enc.encoder_is("qangle_precise") {
        return Ok(FieldDecoder::QAnglePrecise);
    }
    match enc.bit_count {
        Some(bits) if enc.encoder_is("qangle_pitch_yaw") => {
            Ok(FieldDecoder::QAnglePitchYaw(angle_bits(field, bits)?))
        }
        Some(bits) if bits != 0 => Ok(FieldDecoder::QAngleBits(angle_bits(field, bits)?)),
        _ => Ok(FieldDecoder::QAngleCoord),
    }
}

fn unsigned64(enc: &FieldEncoding) -> FieldDecoder {
    if enc.encoder_is("fixed64") {
        FieldDecoder::Fixed64
    } else {
        FieldDecoder::Unsigned64
    }
}

/// Parameterised decoders keyed by base type.
fn factory(field: &str, base_type: &str, enc: &FieldEncoding) -> Option<SchemaResult<FieldDecoder>> {
    let decoder = match base_type {
        "float32" => float(field, enc).map(FieldDecoder::Float),
        "CNetworkedQuantizedFloat" => quantized(field, enc).map(FieldDecoder::Float),
        "uint64" | "CStrongHandle" => Ok(unsigned64(enc)),
        "Vector" | "VectorWS" => vector(field, enc, 3),
        "Vector2D" => vector(field, enc, 2),
        "Vector4D" | "Quaternion" => vector(field, enc, 4),
        "CTransform" => vector(field, enc, 6),
        "QAngle" => qangle(field, enc),
        _ => return None,
    };
    Some(decoder)
}

fn name_override(var_name: &str) -> Option<FieldDecoder> {
    match var_name {
        "m_iClip1" => Some(FieldDecoder::Ammo),
        _ => None,
    }
}

/// Static decoders keyed by base type.
#[must_use]
pub fn type_decoder(base_type: &str) -> Option<FieldDecoder> {
    use FieldDecoder::{Bool, Component, Float, Signed, String, Unsigned};

    Some(match base_type {
        "bool" => Bool,
        "int8" | "int16" | "int32" => Signed,
        "uint8" | "uint16" | "uint32" => Unsigned,
        "char" | "CUtlString" | "CUtlSymbolLarge" => String,
        "GameTime_t" => Float(FloatDecoder::NoScale),
        "CHandle" | "Color" | "CUtlStringToken" | "EHandle" | "CEntityHandle"
        | "CGameSceneNodeHandle" | "CStrongHandle" | "AttachmentHandle_t" => Unsigned,
        "HSequence" | "CEntityIndex" => Signed,

        "MoveCollide_t" | "MoveType_t" | "RenderMode_t" | "RenderFx_t" | "SolidType_t"
        | "SurroundingBoundsType_t" | "ModelConfigHandle_t" | "WeaponState_t"
        | "DoorState_t" | "BeamClipStyle_t" => Unsigned,
        "NPC_STATE" | "StanceType_t" | "RagdollBlendDirection" | "BeamType_t"
        | "EntityDisolveType_t" => Signed,

        "ValueRemapperInputType_t"
        | "ValueRemapperOutputType_t"
        | "ValueRemapperHapticsType_t"
        | "ValueRemapperMomentumType_t"
        | "ValueRemapperRatchetType_t"
        | "PointWorldTextJustifyHorizontal_t"
        | "PointWorldTextJustifyVertical_t"
        | "PointWorldTextReorientMode_t"
        | "PoseController_FModType_t"
        | "ShardSolid_t"
        | "ShatterPanelMode" => Unsigned,
        "PrecipitationType_t" => Signed,

        "gender_t" | "item_definition_index_t" | "itemid_t" | "style_index_t"
        | "attributeprovidertypes_t" | "DamageOptions_t" | "ScreenEffectType_t"
        | "MaterialModifyMode_t" => Unsigned,
        "AmmoIndex_t" | "TakeDamageFlags_t" => Signed,

        "CSWeaponMode" | "ESurvivalSpawnTileState" | "SpawnStage_t"
        | "ESurvivalGameRuleDecision_t" | "RelativeDamagedDirection_t" | "CSPlayerState"
        | "MedalRank_t" | "CSPlayerBlockingUseAction_t" | "MoveMountingAmount_t"
        | "QuestProgress::Reason" | "tablet_skin_state_t" => Unsigned,

        "CBodyComponent" | "CPhysicsComponent" | "CLightComponent" | "CRenderComponent" => {
            Component
        }
        _ => return None,
    })
}

/// Resolves the decoder of a field from its name, base type and encoding.
pub fn find_decoder(var_name: &str, base_type: &str, enc: &FieldEncoding) -> SchemaResult<FieldDecoder> {
    if let Some(decoder) = factory(var_name, base_type, enc) {
        return decoder;
    }
    if let Some(decoder) = name_override(var_name) {
        return Ok(decoder);
    }
    Ok(type_decoder(base_type).unwrap_or(FieldDecoder::Unsigned))
}

/// Resolves the element decoder of a dynamic array from its element type.
///
/// The element inherits the container field's encoding parameters.
pub fn find_child_decoder(
    var_name: &str,
    element_type: &str,
    enc: &FieldEncoding,
) -> SchemaResult<FieldDecoder> {
    if let Some(decoder) = factory(var_name, element_type, enc) {
        return decoder;
    }
    Ok(type_decoder(element_type).unwrap_or(FieldDecoder::Unsigned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitstream::BitWriter;

    fn enc(encoder: Option<&str>, bits: Option<i32>) -> FieldEncoding {
        FieldEncoding {
            encoder: encoder.map(str::to_owned),
            bit_count: bits,
            ..FieldEncoding::default()
        }
    }

    #[test]
    fn lookup_order_prefers_factory_then_name() {
        let plain = FieldEncoding::default();
        assert_eq!(
            find_decoder("m_iClip1", "int32", &plain).unwrap(),
            FieldDecoder::Ammo
        );
        assert_eq!(
            find_decoder("m_iHealth", "int32", &plain).unwrap(),
            FieldDecoder::Signed
        );
        assert_eq!(
            find_decoder("m_nUnknown", "SomethingNew_t", &plain).unwrap(),
            FieldDecoder::Unsigned
        );
        assert_eq!(
            find_decoder("m_flValue", "float32", &plain).unwrap(),
            FieldDecoder::Float(FloatDecoder::NoScale)
        );
    }

    #[test]
    fn float_encoders() {
        assert_eq!(
            find_decoder("x", "float32", &enc(Some("coord"), None)).unwrap(),
            FieldDecoder::Float(FloatDecoder::Coord)
        );
        assert_eq!(
            find_decoder("x", "float32", &enc(None, Some(32))).unwrap(),
            FieldDecoder::Float(FloatDecoder::NoScale)
        );
        assert!(matches!(
            find_decoder("x", "float32", &enc(None, Some(8))).unwrap(),
            FieldDecoder::Float(FloatDecoder::Quantized(_))
        ));
    }

    #[test]
    fn vector_shapes() {
        assert_eq!(
            find_decoder("n", "Vector", &enc(Some("normal"), None)).unwrap(),
            FieldDecoder::VectorNormal
        );
        assert_eq!(
            find_decoder("t", "CTransform", &FieldEncoding::default()).unwrap(),
            FieldDecoder::Vector {
                element: FloatDecoder::NoScale,
                count: 6
            }
        );
    }

    #[test]
    fn qangle_variants() {
        assert_eq!(
            find_decoder("a", "QAngle", &enc(Some("qangle_precise"), Some(20))).unwrap(),
            FieldDecoder::QAnglePrecise
        );
        assert_eq!(
            find_decoder("a", "QAngle", &enc(Some("qangle_pitch_yaw"), Some(16))).unwrap(),
            FieldDecoder::QAnglePitchYaw(16)
        );
        assert_eq!(
            find_decoder("a", "QAngle", &enc(None, Some(10))).unwrap(),
            FieldDecoder::QAngleBits(10)
        );
        assert_eq!(
            find_decoder("a", "QAngle", &FieldEncoding::default()).unwrap(),
            FieldDecoder::QAngleCoord
        );
        assert!(matches!(
            find_decoder("a", "QAngle", &enc(None, Some(300))),
            Err(SchemaError::InvalidBitCount { bits: 300, .. })
        ));
    }

    #[test]
    fn handles_use_fixed64_encoder() {
        assert_eq!(
            find_decoder("h", "CStrongHandle", &enc(Some("fixed64"), None)).unwrap(),
            FieldDecoder::Fixed64
        );
        assert_eq!(
            find_decoder("h", "uint64", &FieldEncoding::default()).unwrap(),
            FieldDecoder::Unsigned64
        );
    }

    #[test]
    fn decode_scalars() {
        let mut writer = BitWriter::new();
        writer.write_bool(true);
        writer.write_vars32(-7);
        writer.write_varu32(0); // empty clip
        writer.write_cstring("weapon_ak47");
        writer.write_varu32(128); // simtime ticks
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        assert_eq!(
            FieldDecoder::Bool.decode(&mut reader).unwrap(),
            PropertyValue::Bool(true)
        );
        assert_eq!(
            FieldDecoder::Signed.decode(&mut reader).unwrap(),
            PropertyValue::Signed(-7)
        );
        assert_eq!(
            FieldDecoder::Ammo.decode(&mut reader).unwrap(),
            PropertyValue::Signed(-1)
        );
        assert_eq!(
            FieldDecoder::String.decode(&mut reader).unwrap(),
            PropertyValue::from("weapon_ak47")
        );
        assert_eq!(
            FieldDecoder::Float(FloatDecoder::SimulationTime)
                .decode(&mut reader)
                .unwrap(),
            PropertyValue::Float(2.0)
        );
    }

    #[test]
    fn decode_vector_and_angles() {
        let mut writer = BitWriter::new();
        writer.write_f32(1.5);
        writer.write_f32(-2.0);
        // precise angle: only Y present, 180 degrees -> 0
        writer.write_bool(false);
        writer.write_bool(true);
        writer.write_bool(false);
        writer.write_bits(1 << 19, 20).unwrap();
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let v2 = FieldDecoder::Vector {
            element: FloatDecoder::NoScale,
            count: 2,
        };
        assert_eq!(
            v2.decode(&mut reader).unwrap(),
            PropertyValue::Vector2([1.5, -2.0])
        );
        assert_eq!(
            FieldDecoder::QAnglePrecise.decode(&mut reader).unwrap(),
            PropertyValue::Vector3([0.0, 0.0, 0.0])
        );
    }

    #[test]
    fn component_reads_one_bit() {
        let mut reader = BitReader::new(&[0b1]);
        assert_eq!(
            FieldDecoder::Component.decode(&mut reader).unwrap(),
            PropertyValue::Unsigned(1)
        );
        assert_eq!(reader.bit_position(), 1);
    }
}
