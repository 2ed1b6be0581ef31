//! Flattening of send tables into per-class property lists.

use std::collections::HashMap;

use bitstream::BitReader;
use tracing::debug;

use super::descriptor::{PropFlags, PropType, SendProp, SendTable, ServerClassInfo};
use crate::error::{SchemaError, SchemaResult};

/// Nesting limit for send-table references.
pub const MAX_TABLE_DEPTH: usize = 64;

/// Priority bucket that also collects every `CHANGES_OFTEN` prop.
pub const CHANGES_OFTEN_PRIORITY: i32 = 64;

/// One property slot of a flattened class.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatProp {
    /// Dotted path name, e.g. `m_Local.m_vecPunchAngle`.
    pub name: String,
    pub kind: PropType,
    pub prop: SendProp,
    /// Element descriptor of an array prop.
    pub element: Option<Box<FlatProp>>,
}

impl FlatProp {
    fn new(name: String, prop: &SendProp) -> SchemaResult<Self> {
        Ok(Self {
            name,
            kind: prop.kind()?,
            prop: prop.clone(),
            element: None,
        })
    }
}

/// A compiled legacy class.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyClass {
    pub class_id: u32,
    pub name: String,
    pub data_table: String,
    /// Slots in transmission order.
    pub props: Vec<FlatProp>,
    /// Ids of the `baseclass` chain, deepest first.
    pub base_classes: Vec<u32>,
    index_by_name: HashMap<String, usize>,
}

impl LegacyClass {
    /// Slot index of a property name.
    #[must_use]
    pub fn prop_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }

    /// The slot at `index`.
    #[must_use]
    pub fn prop(&self, index: usize) -> Option<&FlatProp> {
        self.props.get(index)
    }

    /// Flattened names in slot order.
    pub fn prop_names(&self) -> impl Iterator<Item = &str> {
        self.props.iter().map(|p| p.name.as_str())
    }
}

/// Number of bits used to encode a class id.
#[must_use]
pub fn class_bits(class_count: usize) -> u8 {
    if class_count <= 1 {
        return 0;
    }
    (usize::BITS - (class_count - 1).leading_zeros()) as u8
}

/// Reads the server-class list that follows the send tables.
pub fn read_class_list(reader: &mut BitReader<'_>) -> SchemaResult<Vec<ServerClassInfo>> {
    let count = reader.read_u32(16)?;
    let mut classes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let class_id = reader.read_u32(16)?;
        if class_id > count {
            return Err(SchemaError::InvalidClassIndex {
                id: class_id,
                count,
            });
        }
        let name = reader.read_cstring()?;
        let data_table = reader.read_cstring()?;
        classes.push(ServerClassInfo {
            class_id,
            name,
            data_table,
        });
    }
    Ok(classes)
}

struct Exclude<'a> {
    table: &'a str,
    var_name: &'a str,
}

struct Flattener<'a> {
    tables: HashMap<&'a str, &'a SendTable>,
    classes: &'a [ServerClassInfo],
    excludes: Vec<Exclude<'a>>,
    base_classes: Vec<u32>,
}

impl<'a> Flattener<'a> {
    fn new(tables: &'a [SendTable], classes: &'a [ServerClassInfo]) -> Self {
        let mut by_name = HashMap::with_capacity(tables.len());
        for table in tables {
            by_name.entry(table.name.as_str()).or_insert(table);
        }
        Self {
            tables: by_name,
            classes,
            excludes: Vec::new(),
            base_classes: Vec::new(),
        }
    }

    fn table(&self, name: &str, referenced_by: &str) -> SchemaResult<&'a SendTable> {
        self.tables
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownTable {
                table: name.to_owned(),
                referenced_by: referenced_by.to_owned(),
            })
    }

    fn check_depth(table: &SendTable, depth: usize) -> SchemaResult<()> {
        if depth > MAX_TABLE_DEPTH {
            return Err(SchemaError::TableTooDeep {
                table: table.name.clone(),
                max: MAX_TABLE_DEPTH,
            });
        }
        Ok(())
    }

    fn gather_excludes(
        &mut self,
        table: &'a SendTable,
        collect_base_classes: bool,
        depth: usize,
    ) -> SchemaResult<()> {
        Self::check_depth(table, depth)?;
        for prop in &table.props {
            if prop.has(PropFlags::EXCLUDE) {
                self.excludes.push(Exclude {
                    table: &prop.dt_name,
                    var_name: &prop.var_name,
                });
            }
        }

        for prop in &table.props {
            if prop.prop_type != PropType::DataTable.raw() {
                continue;
            }
            let sub = self.table(&prop.dt_name, &table.name)?;
            if collect_base_classes && prop.var_name == "baseclass" {
                self.gather_excludes(sub, true, depth + 1)?;
                if let Some(class) = self.classes.iter().find(|c| c.data_table == sub.name) {
                    self.base_classes.push(class.class_id);
                }
            } else {
                self.gather_excludes(sub, false, depth + 1)?;
            }
        }
        Ok(())
    }

    fn is_excluded(&self, table: &SendTable, prop: &SendProp) -> bool {
        self.excludes
            .iter()
            .any(|e| e.table == table.name && e.var_name == prop.var_name)
    }

    /// Nested non-collapsible tables land in `out` before the props collected
    /// at this level.
    fn gather_props(
        &self,
        table: &'a SendTable,
        prefix: &str,
        out: &mut Vec<FlatProp>,
        depth: usize,
    ) -> SchemaResult<()> {
        let mut level = Vec::new();
        self.gather_props_iterate(table, prefix, &mut level, out, depth)?;
        out.append(&mut level);
        Ok(())
    }

    fn gather_props_iterate(
        &self,
        table: &'a SendTable,
        prefix: &str,
        level: &mut Vec<FlatProp>,
        out: &mut Vec<FlatProp>,
        depth: usize,
    ) -> SchemaResult<()> {
        Self::check_depth(table, depth)?;
        for (i, prop) in table.props.iter().enumerate() {
            if prop.has(PropFlags::INSIDE_ARRAY)
                || prop.has(PropFlags::EXCLUDE)
                || self.is_excluded(table, prop)
            {
                continue;
            }

            match prop.kind()? {
                PropType::DataTable => {
                    let sub = self.table(&prop.dt_name, &table.name)?;
                    if prop.has(PropFlags::COLLAPSIBLE) {
                        self.gather_props_iterate(sub, prefix, level, out, depth + 1)?;
                    } else {
                        let mut nested = prefix.to_owned();
                        if !prop.var_name.is_empty() {
                            nested.push_str(&prop.var_name);
                            nested.push('.');
                        }
                        self.gather_props(sub, &nested, out, depth + 1)?;
                    }
                }
                PropType::Array => {
                    let element = i
                        .checked_sub(1)
                        .and_then(|j| table.props.get(j))
                        .ok_or_else(|| SchemaError::MissingArrayElement {
                            prop: prop.var_name.clone(),
                            table: table.name.clone(),
                        })?;
                    let mut flat = FlatProp::new(format!("{prefix}{}", prop.var_name), prop)?;
                    flat.element = Some(Box::new(FlatProp::new(element.var_name.clone(), element)?));
                    level.push(flat);
                }
                _ => level.push(FlatProp::new(format!("{prefix}{}", prop.var_name), prop)?),
            }
        }
        Ok(())
    }

    fn flatten(&mut self, class: &ServerClassInfo) -> SchemaResult<LegacyClass> {
        let table = self
            .tables
            .get(class.data_table.as_str())
            .copied()
            .ok_or_else(|| SchemaError::UnknownClassTable {
                class: class.name.clone(),
                table: class.data_table.clone(),
            })?;

        self.excludes.clear();
        self.base_classes.clear();
        self.gather_excludes(table, true, 0)?;

        let mut props = Vec::new();
        self.gather_props(table, "", &mut props, 0)?;
        sort_by_priority(&mut props);

        let mut index_by_name = HashMap::with_capacity(props.len());
        for (i, prop) in props.iter().enumerate() {
            index_by_name.insert(prop.name.clone(), i);
        }

        Ok(LegacyClass {
            class_id: class.class_id,
            name: class.name.clone(),
            data_table: class.data_table.clone(),
            props,
            base_classes: self.base_classes.clone(),
            index_by_name,
        })
    }
}

/// Reorders props into transmission order.
///
/// For each distinct priority in ascending order (64 always included), props
/// of that priority are swapped forward one at a time; the 64 bucket also
/// takes every `CHANGES_OFTEN` prop. The swap-based walk is not stable and
/// must be kept as is, since legacy updates address slots by position.
pub fn sort_by_priority(props: &mut [FlatProp]) {
    let mut priorities: Vec<i32> = props
        .iter()
        .map(|p| p.prop.priority)
        .chain(std::iter::once(CHANGES_OFTEN_PRIORITY))
        .collect();
    priorities.sort_unstable();
    priorities.dedup();

    let mut start = 0;
    for priority in priorities {
        loop {
            let mut cursor = start;
            while cursor < props.len() {
                let prop = &props[cursor].prop;
                if prop.priority == priority
                    || (priority == CHANGES_OFTEN_PRIORITY && prop.has(PropFlags::CHANGES_OFTEN))
                {
                    if start != cursor {
                        props.swap(start, cursor);
                    }
                    start += 1;
                    break;
                }
                cursor += 1;
            }
            if cursor == props.len() {
                break;
            }
        }
    }
}

/// Compiles every class of a send-table packet.
pub fn compile_send_tables(
    tables: &[SendTable],
    classes: &[ServerClassInfo],
) -> SchemaResult<Vec<LegacyClass>> {
    let mut flattener = Flattener::new(tables, classes);
    let compiled = classes
        .iter()
        .map(|class| flattener.flatten(class))
        .collect::<SchemaResult<Vec<_>>>()?;
    debug!(
        tables = tables.len(),
        classes = compiled.len(),
        "compiled send tables"
    );
    Ok(compiled)
}
