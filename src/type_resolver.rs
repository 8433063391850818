//! Declared-type resolution for annotated fields.
//!
//! A `@Property` on a field without an explicit `type` takes its schema from
//! the field's declared type as written in the source (`Option<Vec<u32>>`,
//! `?string`, `List<Project>`, `int[]`, ...). The type string is parsed into a
//! [`TypeInfo`] and then classified into a [`ResolvedType`].

use log::debug;

/// Structural view of a declared type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    /// Unqualified base name (`Vec`, `Project`, `string`)
    pub name: String,
    pub generic_args: Vec<TypeInfo>,
    /// Written as `?T`, `T|null` or with a nullable wrapper
    pub is_option: bool,
    /// Written as `T[]` or `[T]`
    pub is_vec: bool,
}

impl TypeInfo {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generic_args: Vec::new(),
            is_option: false,
            is_vec: false,
        }
    }

    /// Parses a declared type. Returns `None` for empty or unbalanced input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        // Union types: `null` members make the rest nullable
        let members = split_top_level(raw, '|')?;
        if members.len() > 1 {
            let non_null: Vec<&str> = members
                .iter()
                .map(|m| m.trim())
                .filter(|m| !m.eq_ignore_ascii_case("null"))
                .collect();
            let mut info = match non_null.as_slice() {
                [single] => Self::parse(single)?,
                _ => Self::named("mixed"),
            };
            info.is_option |= non_null.len() < members.len();
            return Some(info);
        }

        if let Some(inner) = raw.strip_prefix('?') {
            let mut info = Self::parse(inner)?;
            info.is_option = true;
            return Some(info);
        }
        if let Some(inner) = raw.strip_suffix("[]") {
            let mut info = Self::named("[]");
            info.generic_args.push(Self::parse(inner)?);
            info.is_vec = true;
            return Some(info);
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            // `[T; N]` arrays keep only the element type
            let element = inner.split(';').next().unwrap_or(inner);
            let mut info = Self::named("[]");
            info.generic_args.push(Self::parse(element)?);
            info.is_vec = true;
            return Some(info);
        }
        let raw = raw.trim_start_matches('&').trim_start_matches("mut ").trim();

        let (base, args) = match raw.find('<') {
            Some(open) => {
                let inner = raw[open + 1..].strip_suffix('>')?;
                let args = split_top_level(inner, ',')?
                    .into_iter()
                    .filter(|arg| !arg.trim().starts_with('\''))
                    .map(Self::parse)
                    .collect::<Option<Vec<_>>>()?;
                (&raw[..open], args)
            }
            None => (raw, Vec::new()),
        };

        let name = last_segment(base.trim());
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            generic_args: args,
            is_option: false,
            is_vec: false,
        })
    }
}

/// Primitive types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    String,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Bool,
    Char,
    /// A numeric type of unspecified width (`number`, `decimal`)
    Number,
    Date,
    DateTime,
}

impl PrimitiveType {
    /// Maps a base type name from any supported source language.
    pub fn parse(type_name: &str) -> Option<Self> {
        match type_name {
            "String" | "string" | "str" | "&str" => Some(PrimitiveType::String),
            "i8" | "sbyte" => Some(PrimitiveType::I8),
            "i16" | "short" | "Short" => Some(PrimitiveType::I16),
            "i32" | "int" | "Integer" | "integer" | "isize" => Some(PrimitiveType::I32),
            "i64" | "long" | "Long" | "bigint" => Some(PrimitiveType::I64),
            "i128" => Some(PrimitiveType::I128),
            "u8" | "byte" | "Byte" => Some(PrimitiveType::U8),
            "u16" | "ushort" => Some(PrimitiveType::U16),
            "u32" | "uint" | "usize" => Some(PrimitiveType::U32),
            "u64" | "ulong" => Some(PrimitiveType::U64),
            "u128" => Some(PrimitiveType::U128),
            "f32" | "float" | "Float" => Some(PrimitiveType::F32),
            "f64" | "double" | "Double" => Some(PrimitiveType::F64),
            "number" | "Number" | "decimal" | "BigDecimal" => Some(PrimitiveType::Number),
            "bool" | "boolean" | "Boolean" => Some(PrimitiveType::Bool),
            "char" | "Character" => Some(PrimitiveType::Char),
            "NaiveDate" | "LocalDate" => Some(PrimitiveType::Date),
            "DateTime" | "NaiveDateTime" | "DateTimeInterface" | "Carbon" | "LocalDateTime"
            | "Instant" | "Date" => Some(PrimitiveType::DateTime),
            _ => None,
        }
    }
}

/// What a declared type means for schema generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    Array(Box<ResolvedType>),
    /// A key/value container (`HashMap`, `Map`, `Dictionary`)
    Map,
    /// A user type, referenced by its unqualified name
    Named(String),
    /// Nothing useful can be said (`mixed`, `any`, unions)
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub kind: TypeKind,
    pub nullable: bool,
}

const OPTION_WRAPPERS: &[&str] = &["Option", "Optional", "Nullable"];
const TRANSPARENT_WRAPPERS: &[&str] = &["Box", "Arc", "Rc", "Cow", "RefCell", "Cell", "Mutex"];
const SEQUENCES: &[&str] = &[
    "[]",
    "Vec",
    "VecDeque",
    "List",
    "ArrayList",
    "LinkedList",
    "Set",
    "HashSet",
    "BTreeSet",
    "IndexSet",
    "Collection",
    "Iterable",
    "IEnumerable",
    "Array",
    "ReadonlyArray",
    "array",
    "iterable",
];
const MAPS: &[&str] = &[
    "HashMap",
    "BTreeMap",
    "IndexMap",
    "Map",
    "Dictionary",
    "Record",
    "object",
    "Object",
    "stdClass",
];
const OPAQUE: &[&str] = &["mixed", "any", "unknown", "Value", "dynamic", "self", "static"];

/// Resolves a declared type string.
pub fn resolve_declared_type(raw: &str) -> ResolvedType {
    match TypeInfo::parse(raw) {
        Some(info) => resolve_type_info(&info),
        None => {
            debug!("Unparseable declared type: {}", raw);
            ResolvedType {
                kind: TypeKind::Unknown,
                nullable: false,
            }
        }
    }
}

pub fn resolve_type_info(info: &TypeInfo) -> ResolvedType {
    let first_arg = info.generic_args.first();
    let name = info.name.as_str();

    let mut resolved = if OPTION_WRAPPERS.contains(&name) {
        match first_arg {
            Some(inner) => {
                let mut inner = resolve_type_info(inner);
                inner.nullable = true;
                inner
            }
            None => unknown(),
        }
    } else if TRANSPARENT_WRAPPERS.contains(&name) {
        first_arg.map(resolve_type_info).unwrap_or_else(unknown)
    } else if info.is_vec || SEQUENCES.contains(&name) {
        let element = first_arg.map(resolve_type_info).unwrap_or_else(unknown);
        ResolvedType {
            kind: TypeKind::Array(Box::new(element)),
            nullable: false,
        }
    } else if MAPS.contains(&name) {
        ResolvedType {
            kind: TypeKind::Map,
            nullable: false,
        }
    } else if OPAQUE.contains(&name) {
        unknown()
    } else if let Some(primitive) = PrimitiveType::parse(name) {
        ResolvedType {
            kind: TypeKind::Primitive(primitive),
            nullable: false,
        }
    } else {
        ResolvedType {
            kind: TypeKind::Named(name.to_string()),
            nullable: false,
        }
    };

    resolved.nullable |= info.is_option;
    resolved
}

fn unknown() -> ResolvedType {
    ResolvedType {
        kind: TypeKind::Unknown,
        nullable: false,
    }
}

/// Last segment of a `::`, `\` or `.` qualified name.
fn last_segment(name: &str) -> &str {
    let name = name.rsplit("::").next().unwrap_or(name);
    let name = name.rsplit('\\').next().unwrap_or(name);
    name.rsplit('.').next().unwrap_or(name)
}

/// Splits on `sep` outside angle and square brackets. `None` when unbalanced.
fn split_top_level(raw: &str, sep: char) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut start = 0;
    for (idx, c) in raw.char_indices() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            c if c == sep && depth == 0 => {
                parts.push(&raw[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(&raw[start..]);
    Some(parts)
}
