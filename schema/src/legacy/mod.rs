//! Legacy send-table schemas.
//!
//! Send tables are flattened per server class into a priority-ordered list of
//! property slots. Updates address slots purely by position, so the flatten
//! order is part of the wire contract.

mod decode;
mod descriptor;
mod flatten;

pub use decode::{array_length_bits, decode_prop, MAX_STRING_BITS};
pub use descriptor::{PropFlags, PropType, SendProp, SendTable, ServerClassInfo};
pub use flatten::{
    class_bits, compile_send_tables, read_class_list, sort_by_priority, FlatProp, LegacyClass,
    CHANGES_OFTEN_PRIORITY, MAX_TABLE_DEPTH,
};
