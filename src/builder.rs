//! Lowering of evaluated condition trees into the flat condition format, plus
//! the serializers and readers for that format.

mod condition;
mod rich_presence;
mod trigger;
mod value;

pub use condition::{
    Condition, ConditionFlag, FieldSize, FieldType, MemoryAccessor, Operand, Operator, WireError,
    WireResult,
};
pub use rich_presence::RichPresenceBuilder;
pub use trigger::{Trigger, build_trigger};
pub use value::{Value, ValueFormat, ValueTerm, build_value};
