//! The schema registry shared by both decoding strategies.

use std::collections::HashMap;

use bitstream::BitReader;
use tracing::{debug, warn};

use crate::error::{SchemaError, SchemaResult};
use crate::legacy::{class_bits, compile_send_tables, read_class_list, LegacyClass, SendTable, ServerClassInfo};
use crate::modern::{class_id_bits, ClassInfoEntry, FlattenedSerializerMsg, SerializerId, SerializerSet};

/// How entity updates address their fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodingStrategy {
    /// Send tables flattened into positional property lists.
    Legacy,
    /// Flattened serializers addressed by Huffman-coded field paths.
    FieldPath,
}

/// Schema compilation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Game build of the capture; gates build-specific field patches.
    pub game_build: Option<u32>,
}

impl SchemaOptions {
    /// Creates options for an unknown build.
    #[must_use]
    pub const fn new() -> Self {
        Self { game_build: None }
    }

    /// Sets the game build.
    #[must_use]
    pub const fn with_game_build(mut self, build: u32) -> Self {
        self.game_build = Some(build);
        self
    }
}

/// A class bound to a flattened serializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernClass {
    pub class_id: u32,
    pub name: String,
    /// `None` until a serializer with the class name is compiled.
    pub serializer: Option<SerializerId>,
}

/// A compiled class of either strategy.
#[derive(Debug, Clone, Copy)]
pub enum SchemaClass<'a> {
    Legacy(&'a LegacyClass),
    Modern(&'a ModernClass),
}

impl SchemaClass<'_> {
    /// Numeric class id.
    #[must_use]
    pub const fn class_id(&self) -> u32 {
        match self {
            Self::Legacy(class) => class.class_id,
            Self::Modern(class) => class.class_id,
        }
    }

    /// Class name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Legacy(class) => &class.name,
            Self::Modern(class) => &class.name,
        }
    }
}

/// All compiled classes, serializers and raw baselines of one capture.
///
/// Compiled classes and serializers are immutable once added. Baselines are
/// stored raw; decoding them is left to the entity store.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    strategy: DecodingStrategy,
    options: SchemaOptions,
    legacy: Vec<LegacyClass>,
    legacy_by_id: HashMap<u32, usize>,
    serializers: SerializerSet,
    modern: HashMap<u32, ModernClass>,
    class_names: HashMap<String, u32>,
    baselines: HashMap<u32, Vec<u8>>,
    class_id_bits: u8,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(strategy: DecodingStrategy, options: SchemaOptions) -> Self {
        Self {
            strategy,
            options,
            legacy: Vec::new(),
            legacy_by_id: HashMap::new(),
            serializers: SerializerSet::new(),
            modern: HashMap::new(),
            class_names: HashMap::new(),
            baselines: HashMap::new(),
            class_id_bits: 0,
        }
    }

    /// Creates an empty registry for send-table captures.
    #[must_use]
    pub fn legacy() -> Self {
        Self::new(DecodingStrategy::Legacy, SchemaOptions::default())
    }

    /// Creates an empty registry for flattened-serializer captures.
    #[must_use]
    pub fn modern(options: SchemaOptions) -> Self {
        Self::new(DecodingStrategy::FieldPath, options)
    }

    #[must_use]
    pub const fn strategy(&self) -> DecodingStrategy {
        self.strategy
    }

    #[must_use]
    pub const fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Width of class ids in entity messages.
    #[must_use]
    pub const fn class_id_bits(&self) -> u8 {
        self.class_id_bits
    }

    /// Number of known classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        match self.strategy {
            DecodingStrategy::Legacy => self.legacy.len(),
            DecodingStrategy::FieldPath => self.modern.len(),
        }
    }

    /// Compiles send tables against an already decoded class list.
    ///
    /// Replaces any previously compiled legacy classes.
    pub fn compile_send_tables(&mut self, tables: &[SendTable], classes: &[ServerClassInfo]) -> SchemaResult<usize> {
        let compiled = compile_send_tables(tables, classes)?;
        self.legacy_by_id = compiled
            .iter()
            .enumerate()
            .map(|(i, class)| (class.class_id, i))
            .collect();
        self.class_names = compiled
            .iter()
            .map(|class| (class.name.clone(), class.class_id))
            .collect();
        self.class_id_bits = class_bits(compiled.len());
        self.legacy = compiled;
        debug!(
            tables = tables.len(),
            classes = self.legacy.len(),
            class_bits = self.class_id_bits,
            "registered legacy classes"
        );
        Ok(self.legacy.len())
    }

    /// Compiles send tables followed by a bit-packed server-class list.
    pub fn compile_send_table_packet(&mut self, tables: &[SendTable], class_list: &[u8]) -> SchemaResult<usize> {
        let mut reader = BitReader::new(class_list);
        let classes = read_class_list(&mut reader)?;
        self.compile_send_tables(tables, &classes)
    }

    /// Compiles a flattened-serializer message.
    ///
    /// Classes already bound by name pick up the newly compiled serializers.
    pub fn compile_serializers(&mut self, msg: &FlattenedSerializerMsg) -> SchemaResult<usize> {
        let added = self.serializers.compile(msg, self.options.game_build)?;
        for class in self.modern.values_mut() {
            if let Some(id) = self.serializers.latest(&class.name) {
                class.serializer = Some(id);
            }
        }
        debug!(
            serializers = added,
            total = self.serializers.len(),
            game_build = ?self.options.game_build,
            "compiled flattened serializers"
        );
        Ok(added)
    }

    /// Binds class ids to serializers by network name.
    pub fn bind_classes(&mut self, entries: &[ClassInfoEntry]) {
        for entry in entries {
            let serializer = self.serializers.latest(&entry.network_name);
            if serializer.is_none() {
                warn!(class = %entry.network_name, class_id = entry.class_id, "class has no serializer yet");
            }
            self.class_names.insert(entry.network_name.clone(), entry.class_id);
            self.modern.insert(
                entry.class_id,
                ModernClass {
                    class_id: entry.class_id,
                    name: entry.network_name.clone(),
                    serializer,
                },
            );
        }
        debug!(classes = self.modern.len(), "bound classes");
    }

    /// Derives the class-id width from the server's class count.
    pub fn set_max_classes(&mut self, max_classes: u32) {
        self.class_id_bits = class_id_bits(max_classes);
    }

    /// Stores the raw instance baseline of a class.
    pub fn set_baseline(&mut self, class_id: u32, data: impl Into<Vec<u8>>) {
        self.baselines.insert(class_id, data.into());
    }

    /// The raw instance baseline of a class.
    #[must_use]
    pub fn baseline(&self, class_id: u32) -> Option<&[u8]> {
        self.baselines.get(&class_id).map(Vec::as_slice)
    }

    /// Looks up a class by id.
    #[must_use]
    pub fn class(&self, class_id: u32) -> Option<SchemaClass<'_>> {
        match self.strategy {
            DecodingStrategy::Legacy => self.legacy_class(class_id).map(SchemaClass::Legacy),
            DecodingStrategy::FieldPath => self.modern_class(class_id).map(SchemaClass::Modern),
        }
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<SchemaClass<'_>> {
        self.class_names.get(name).and_then(|&id| self.class(id))
    }

    #[must_use]
    pub fn legacy_class(&self, class_id: u32) -> Option<&LegacyClass> {
        self.legacy_by_id.get(&class_id).map(|&i| &self.legacy[i])
    }

    #[must_use]
    pub fn modern_class(&self, class_id: u32) -> Option<&ModernClass> {
        self.modern.get(&class_id)
    }

    /// All legacy classes in class-list order.
    #[must_use]
    pub fn legacy_classes(&self) -> &[LegacyClass] {
        &self.legacy
    }

    #[must_use]
    pub const fn serializers(&self) -> &SerializerSet {
        &self.serializers
    }

    /// Root serializer of a bound class.
    pub fn class_serializer(&self, class_id: u32) -> SchemaResult<SerializerId> {
        let class = self
            .modern_class(class_id)
            .ok_or(SchemaError::UnknownClass { class_id })?;
        class.serializer.ok_or_else(|| SchemaError::UnboundClass {
            class: class.name.clone(),
            class_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::{PropType, SendProp};
    use crate::modern::FieldSpec;
    use bitstream::BitWriter;

    fn widget_tables() -> Vec<SendTable> {
        vec![SendTable::new("DT_Widget")
            .prop(SendProp::new("health", PropType::Int).bits(8))
            .prop(SendProp::new("pos", PropType::Vector))]
    }

    #[test]
    fn legacy_registry_indexes_classes() {
        let mut registry = SchemaRegistry::legacy();
        let classes = [
            ServerClassInfo::new(0, "CWorld", "DT_Widget"),
            ServerClassInfo::new(1, "CWidget", "DT_Widget"),
            ServerClassInfo::new(2, "CGadget", "DT_Widget"),
        ];
        assert_eq!(registry.compile_send_tables(&widget_tables(), &classes).unwrap(), 3);
        assert_eq!(registry.class_id_bits(), 2);
        assert_eq!(registry.class_count(), 3);

        let class = registry.class(1).unwrap();
        assert_eq!(class.name(), "CWidget");
        assert_eq!(registry.class_by_name("CGadget").unwrap().class_id(), 2);
        assert!(registry.class(3).is_none());
        let names: Vec<&str> = registry.legacy_class(1).unwrap().prop_names().collect();
        assert_eq!(names, vec!["health", "pos"]);
    }

    #[test]
    fn legacy_packet_reads_class_list() {
        let mut writer = BitWriter::new();
        writer.write_bits(1, 16).unwrap();
        writer.write_bits(0, 16).unwrap();
        writer.write_cstring("CWidget");
        writer.write_cstring("DT_Widget");
        let bytes = writer.finish();

        let mut registry = SchemaRegistry::legacy();
        registry.compile_send_table_packet(&widget_tables(), &bytes).unwrap();
        assert_eq!(registry.class(0).unwrap().name(), "CWidget");
        assert_eq!(registry.class_id_bits(), 0);
    }

    #[test]
    fn modern_classes_bind_to_latest_serializer() {
        let mut registry = SchemaRegistry::modern(SchemaOptions::new().with_game_build(1000));
        registry.bind_classes(&[ClassInfoEntry::new(4, "CWidget")]);
        assert_eq!(
            registry.class_serializer(4),
            Err(SchemaError::UnboundClass {
                class: "CWidget".to_owned(),
                class_id: 4
            })
        );

        let mut msg = FlattenedSerializerMsg::new();
        msg.add_serializer("CWidget", 0, &[FieldSpec::new("m_iHealth", "int32")]);
        registry.compile_serializers(&msg).unwrap();

        let id = registry.class_serializer(4).unwrap();
        assert_eq!(registry.serializers().serializer(id).name, "CWidget");
        assert_eq!(registry.class_by_name("CWidget").unwrap().class_id(), 4);
        assert_eq!(
            registry.class_serializer(5),
            Err(SchemaError::UnknownClass { class_id: 5 })
        );
    }

    #[test]
    fn class_id_bits_from_max_classes() {
        let mut registry = SchemaRegistry::modern(SchemaOptions::default());
        registry.set_max_classes(300);
        assert_eq!(registry.class_id_bits(), 9);
    }

    #[test]
    fn baselines_are_stored_raw() {
        let mut registry = SchemaRegistry::legacy();
        registry.set_baseline(3, vec![1, 2, 3]);
        assert_eq!(registry.baseline(3), Some(&[1u8, 2, 3][..]));
        assert_eq!(registry.baseline(4), None);
    }
}
