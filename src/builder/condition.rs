use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::ast::ComparisonOperation;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { character: char, position: usize },
    #[error("Unexpected end of input at position {position}")]
    UnexpectedEnd { position: usize },
    #[error("Invalid number '{text}' at position {position}")]
    InvalidNumber { text: String, position: usize },
    #[error("Condition at position {position} requires a comparison")]
    MissingComparison { position: usize },
    #[error("Missing {name} section")]
    MissingSection { name: &'static str },
    #[error("Unknown section '{name}'")]
    UnknownSection { name: String },
}

pub type WireResult<T> = Result<T, WireError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSize {
    Bit0,
    Bit1,
    Bit2,
    Bit3,
    Bit4,
    Bit5,
    Bit6,
    Bit7,
    Low4,
    High4,
    Byte,
    Word,
    TByte,
    DWord,
    BitCount,
}

impl FieldSize {
    const BITS: [FieldSize; 8] = [
        FieldSize::Bit0,
        FieldSize::Bit1,
        FieldSize::Bit2,
        FieldSize::Bit3,
        FieldSize::Bit4,
        FieldSize::Bit5,
        FieldSize::Bit6,
        FieldSize::Bit7,
    ];

    pub fn bit(index: i64) -> Option<FieldSize> {
        usize::try_from(index)
            .ok()
            .and_then(|index| Self::BITS.get(index).copied())
    }

    pub fn from_function_name(name: &str) -> Option<FieldSize> {
        let size = match name {
            "bit0" => FieldSize::Bit0,
            "bit1" => FieldSize::Bit1,
            "bit2" => FieldSize::Bit2,
            "bit3" => FieldSize::Bit3,
            "bit4" => FieldSize::Bit4,
            "bit5" => FieldSize::Bit5,
            "bit6" => FieldSize::Bit6,
            "bit7" => FieldSize::Bit7,
            "low4" => FieldSize::Low4,
            "high4" => FieldSize::High4,
            "byte" => FieldSize::Byte,
            "word" => FieldSize::Word,
            "tbyte" => FieldSize::TByte,
            "dword" => FieldSize::DWord,
            "bitcount" => FieldSize::BitCount,
            _ => return None,
        };
        Some(size)
    }

    pub fn function_name(self) -> &'static str {
        match self {
            FieldSize::Bit0 => "bit0",
            FieldSize::Bit1 => "bit1",
            FieldSize::Bit2 => "bit2",
            FieldSize::Bit3 => "bit3",
            FieldSize::Bit4 => "bit4",
            FieldSize::Bit5 => "bit5",
            FieldSize::Bit6 => "bit6",
            FieldSize::Bit7 => "bit7",
            FieldSize::Low4 => "low4",
            FieldSize::High4 => "high4",
            FieldSize::Byte => "byte",
            FieldSize::Word => "word",
            FieldSize::TByte => "tbyte",
            FieldSize::DWord => "dword",
            FieldSize::BitCount => "bitcount",
        }
    }

    fn code(self) -> char {
        match self {
            FieldSize::Bit0 => 'M',
            FieldSize::Bit1 => 'N',
            FieldSize::Bit2 => 'O',
            FieldSize::Bit3 => 'P',
            FieldSize::Bit4 => 'Q',
            FieldSize::Bit5 => 'R',
            FieldSize::Bit6 => 'S',
            FieldSize::Bit7 => 'T',
            FieldSize::Low4 => 'L',
            FieldSize::High4 => 'U',
            FieldSize::Byte => 'H',
            FieldSize::Word => ' ',
            FieldSize::TByte => 'W',
            FieldSize::DWord => 'X',
            FieldSize::BitCount => 'K',
        }
    }

    fn from_code(code: char) -> Option<FieldSize> {
        let size = match code.to_ascii_uppercase() {
            'M' => FieldSize::Bit0,
            'N' => FieldSize::Bit1,
            'O' => FieldSize::Bit2,
            'P' => FieldSize::Bit3,
            'Q' => FieldSize::Bit4,
            'R' => FieldSize::Bit5,
            'S' => FieldSize::Bit6,
            'T' => FieldSize::Bit7,
            'L' => FieldSize::Low4,
            'U' => FieldSize::High4,
            'H' => FieldSize::Byte,
            ' ' => FieldSize::Word,
            'W' => FieldSize::TByte,
            'X' => FieldSize::DWord,
            'K' => FieldSize::BitCount,
            _ => return None,
        };
        Some(size)
    }
}

/// How a memory read relates to the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Mem,
    Delta,
    Prior,
    Bcd,
}

impl FieldType {
    fn prefix(self) -> &'static str {
        match self {
            FieldType::Mem => "",
            FieldType::Delta => "d",
            FieldType::Prior => "p",
            FieldType::Bcd => "b",
        }
    }

    pub fn function_name(self) -> Option<&'static str> {
        match self {
            FieldType::Mem => None,
            FieldType::Delta => Some("prev"),
            FieldType::Prior => Some("prior"),
            FieldType::Bcd => Some("bcd"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryAccessor {
    pub field_type: FieldType,
    pub size: FieldSize,
    pub address: u32,
}

impl MemoryAccessor {
    pub fn new(size: FieldSize, address: u32) -> Self {
        Self {
            field_type: FieldType::Mem,
            size,
            address,
        }
    }

    pub fn with_type(self, field_type: FieldType) -> Self {
        Self { field_type, ..self }
    }
}

/// Prints the accessor the way a script would spell it.
impl fmt::Display for MemoryAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field_type.function_name() {
            Some(wrapper) => write!(
                f,
                "{wrapper}({}(0x{:06X}))",
                self.size.function_name(),
                self.address
            ),
            None => write!(f, "{}(0x{:06X})", self.size.function_name(), self.address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Memory(MemoryAccessor),
    Value(u32),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Memory(accessor) => write!(
                f,
                "{}0x{}{:06x}",
                accessor.field_type.prefix(),
                accessor.size.code(),
                accessor.address
            ),
            Operand::Value(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionFlag {
    #[default]
    None,
    PauseIf,
    ResetIf,
    AddSource,
    SubSource,
    AddHits,
    SubHits,
    AndNext,
    OrNext,
    Measured,
    Trigger,
    ResetNextIf,
}

impl ConditionFlag {
    fn prefix(self) -> &'static str {
        match self {
            ConditionFlag::None => "",
            ConditionFlag::PauseIf => "P:",
            ConditionFlag::ResetIf => "R:",
            ConditionFlag::AddSource => "A:",
            ConditionFlag::SubSource => "B:",
            ConditionFlag::AddHits => "C:",
            ConditionFlag::SubHits => "D:",
            ConditionFlag::AndNext => "N:",
            ConditionFlag::OrNext => "O:",
            ConditionFlag::Measured => "M:",
            ConditionFlag::Trigger => "T:",
            ConditionFlag::ResetNextIf => "Z:",
        }
    }

    fn from_code(code: char) -> Option<ConditionFlag> {
        let flag = match code {
            'P' => ConditionFlag::PauseIf,
            'R' => ConditionFlag::ResetIf,
            'A' => ConditionFlag::AddSource,
            'B' => ConditionFlag::SubSource,
            'C' => ConditionFlag::AddHits,
            'D' => ConditionFlag::SubHits,
            'N' => ConditionFlag::AndNext,
            'O' => ConditionFlag::OrNext,
            'M' => ConditionFlag::Measured,
            'T' => ConditionFlag::Trigger,
            'Z' => ConditionFlag::ResetNextIf,
            _ => return None,
        };
        Some(flag)
    }

    /// AddSource and SubSource feed their value into the next condition and
    /// carry no comparison of their own.
    pub fn is_source(self) -> bool {
        matches!(self, ConditionFlag::AddSource | ConditionFlag::SubSource)
    }

    pub fn name(self) -> &'static str {
        match self {
            ConditionFlag::None => "",
            ConditionFlag::PauseIf => "PauseIf",
            ConditionFlag::ResetIf => "ResetIf",
            ConditionFlag::AddSource => "AddSource",
            ConditionFlag::SubSource => "SubSource",
            ConditionFlag::AddHits => "AddHits",
            ConditionFlag::SubHits => "SubHits",
            ConditionFlag::AndNext => "AndNext",
            ConditionFlag::OrNext => "OrNext",
            ConditionFlag::Measured => "Measured",
            ConditionFlag::Trigger => "Trigger",
            ConditionFlag::ResetNextIf => "ResetNextIf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Multiply,
    Divide,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, Operator::Multiply | Operator::Divide)
    }
}

impl From<ComparisonOperation> for Operator {
    fn from(op: ComparisonOperation) -> Self {
        match op {
            ComparisonOperation::Equal => Operator::Equal,
            ComparisonOperation::NotEqual => Operator::NotEqual,
            ComparisonOperation::LessThan => Operator::Less,
            ComparisonOperation::LessThanOrEqual => Operator::LessEqual,
            ComparisonOperation::GreaterThan => Operator::Greater,
            ComparisonOperation::GreaterThanOrEqual => Operator::GreaterEqual,
        }
    }
}

/// One line of a trigger: `<flag><left>[<op><right>][.<hits>.]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub flag: ConditionFlag,
    pub left: Operand,
    pub right: Option<(Operator, Operand)>,
    pub hit_target: u32,
}

impl Condition {
    pub fn compare(left: Operand, op: Operator, right: Operand) -> Self {
        Self {
            flag: ConditionFlag::None,
            left,
            right: Some((op, right)),
            hit_target: 0,
        }
    }

    pub fn source(flag: ConditionFlag, left: Operand, modifier: Option<(Operator, Operand)>) -> Self {
        Self {
            flag,
            left,
            right: modifier,
            hit_target: 0,
        }
    }

    pub fn always_true() -> Self {
        Self::compare(Operand::Value(1), Operator::Equal, Operand::Value(1))
    }

    pub fn always_false() -> Self {
        Self::compare(Operand::Value(0), Operator::Equal, Operand::Value(1))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.flag.prefix(), self.left)?;
        if let Some((op, right)) = &self.right {
            write!(f, "{}{}", op.symbol(), right)?;
        }
        if self.hit_target > 0 {
            write!(f, ".{}.", self.hit_target)?;
        }
        Ok(())
    }
}

impl FromStr for Condition {
    type Err = WireError;

    fn from_str(input: &str) -> WireResult<Self> {
        let mut reader = WireReader::new(input);
        let condition = reader.read_condition()?;
        reader.expect_end()?;
        Ok(condition)
    }
}

/// Cursor over serialized condition text.
pub(crate) struct WireReader<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    pub(crate) fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    pub(crate) fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.position += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    pub(crate) fn expect_end(&self) -> WireResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(character) => Err(self.unexpected(character)),
        }
    }

    pub(crate) fn unexpected(&self, character: char) -> WireError {
        WireError::UnexpectedCharacter {
            character,
            position: self.position,
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.position;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.position += c.len_utf8();
        }
        &self.input[start..self.position]
    }

    pub(crate) fn read_condition(&mut self) -> WireResult<Condition> {
        let start = self.position;
        let mut flag = ConditionFlag::None;
        if self.peek_second() == Some(':')
            && let Some(parsed) = self.peek().and_then(ConditionFlag::from_code)
        {
            flag = parsed;
            self.position += 2;
        }

        let left = self.read_operand()?;
        let right = match self.read_operator() {
            Some(op) => Some((op, self.read_operand()?)),
            None => None,
        };

        let has_comparison = matches!(right, Some((op, _)) if op.is_comparison());
        if !flag.is_source() && !has_comparison {
            return Err(WireError::MissingComparison { position: start });
        }

        let mut hit_target = 0;
        if self.match_char('.') {
            hit_target = self.read_decimal()?;
            if !self.match_char('.') {
                return Err(match self.peek() {
                    Some(character) => self.unexpected(character),
                    None => WireError::UnexpectedEnd {
                        position: self.position,
                    },
                });
            }
        }

        Ok(Condition {
            flag,
            left,
            right,
            hit_target,
        })
    }

    pub(crate) fn read_operand(&mut self) -> WireResult<Operand> {
        let field_type = match (self.peek(), self.peek_second()) {
            (Some('d'), Some('0')) => FieldType::Delta,
            (Some('p'), Some('0')) => FieldType::Prior,
            (Some('b'), Some('0')) => FieldType::Bcd,
            _ => FieldType::Mem,
        };
        if field_type != FieldType::Mem {
            self.advance();
        }

        if self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X')) {
            self.position += 2;
            let size = match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => FieldSize::Word,
                Some(c) => {
                    let size = FieldSize::from_code(c).ok_or_else(|| self.unexpected(c))?;
                    self.advance();
                    size
                }
                None => {
                    return Err(WireError::UnexpectedEnd {
                        position: self.position,
                    });
                }
            };
            let address = self.read_hex()?;
            return Ok(Operand::Memory(MemoryAccessor {
                field_type,
                size,
                address,
            }));
        }

        if field_type != FieldType::Mem {
            return Err(match self.peek() {
                Some(character) => self.unexpected(character),
                None => WireError::UnexpectedEnd {
                    position: self.position,
                },
            });
        }

        match self.peek() {
            Some('h' | 'H') => {
                self.advance();
                Ok(Operand::Value(self.read_hex()?))
            }
            Some(c) if c.is_ascii_digit() => Ok(Operand::Value(self.read_decimal()?)),
            Some(character) => Err(self.unexpected(character)),
            None => Err(WireError::UnexpectedEnd {
                position: self.position,
            }),
        }
    }

    fn read_operator(&mut self) -> Option<Operator> {
        let op = match (self.peek()?, self.peek_second()) {
            ('=', _) => Operator::Equal,
            ('!', Some('=')) => Operator::NotEqual,
            ('<', Some('=')) => Operator::LessEqual,
            ('<', _) => Operator::Less,
            ('>', Some('=')) => Operator::GreaterEqual,
            ('>', _) => Operator::Greater,
            ('*', _) => Operator::Multiply,
            ('/', _) => Operator::Divide,
            _ => return None,
        };
        self.position += op.symbol().len();
        Some(op)
    }

    fn read_hex(&mut self) -> WireResult<u32> {
        let position = self.position;
        let text = self.take_while(|c| c.is_ascii_hexdigit());
        u32::from_str_radix(text, 16).map_err(|_| WireError::InvalidNumber {
            text: text.to_string(),
            position,
        })
    }

    pub(crate) fn read_decimal(&mut self) -> WireResult<u32> {
        let position = self.position;
        let text = self.take_while(|c| c.is_ascii_digit());
        text.parse().map_err(|_| WireError::InvalidNumber {
            text: text.to_string(),
            position,
        })
    }

    pub(crate) fn read_signed(&mut self) -> WireResult<i64> {
        let position = self.position;
        let negative = self.match_char('-');
        let text = self.take_while(|c| c.is_ascii_digit());
        let value: i64 = text.parse().map_err(|_| WireError::InvalidNumber {
            text: text.to_string(),
            position,
        })?;
        Ok(if negative { -value } else { value })
    }
}
