//! Parameter types known to the client and the only place where host values
//! are converted to and from their wire form.

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use alloy_primitives::{Address, B256, U256};
use chrono::DateTime;

use super::{Value, WireValue};
use crate::{
    basic_elements::serializers::u256_to_u64,
    constants::{DEFAULT_ROLES, MAX_SAFE_INTEGER},
    crypto::base58::{content_hash_to_digest, digest_to_content_hash},
    error::{ContractClientError, Result},
};

/// Named integer enumeration, e.g. a task role or task status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    name: String,
    variants: Vec<(String, u64)>,
}

impl EnumType {
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        variants: impl IntoIterator<Item = (S, u64)>,
    ) -> Result<Self> {
        let name = name.into();
        let variants: Vec<(String, u64)> = variants
            .into_iter()
            .map(|(variant, value)| (variant.into(), value))
            .collect();

        if variants.is_empty() {
            return Err(ContractClientError::construction(format!(
                "enumeration `{name}` has no variants"
            )));
        }
        for (i, (variant, value)) in variants.iter().enumerate() {
            if variants[..i].iter().any(|(v, n)| v == variant || n == value) {
                return Err(ContractClientError::construction(format!(
                    "enumeration `{name}` repeats variant `{variant}` or value {value}"
                )));
            }
        }

        Ok(Self { name, variants })
    }

    pub fn role() -> Self {
        Self {
            name: "role".to_string(),
            variants: DEFAULT_ROLES
                .iter()
                .map(|(variant, value)| (variant.to_string(), *value))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_of(&self, variant: &str) -> Option<u64> {
        self.variants
            .iter()
            .find(|(name, _)| name == variant)
            .map(|(_, value)| *value)
    }

    /// Exact-match reverse lookup.
    pub fn variant_of(&self, value: u64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, n)| *n == value)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Boolean,
    Number,
    BigNumber,
    Date,
    HexString,
    ContentHash,
    /// An address where the zero address stands for the native asset.
    TokenAddress,
    Enum(Arc<EnumType>),
    String,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Address => write!(f, "address"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::Number => write!(f, "number"),
            ParamType::BigNumber => write!(f, "bigNumber"),
            ParamType::Date => write!(f, "date"),
            ParamType::HexString => write!(f, "hexString"),
            ParamType::ContentHash => write!(f, "contentHash"),
            ParamType::TokenAddress => write!(f, "tokenAddress"),
            ParamType::Enum(enumeration) => write!(f, "{}", enumeration.name()),
            ParamType::String => write!(f, "string"),
        }
    }
}

/// Non-zero, well-formed address. Unassigned roles read back as zero.
pub fn is_valid_address(address: &Address) -> bool {
    !address.is_zero()
}

/// Parses a 0x address. Mixed-case input must carry a valid EIP-55 checksum.
pub fn parse_address(s: &str) -> std::result::Result<Address, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("`{s}` has no 0x prefix"))?;

    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());

    if has_upper && has_lower {
        Address::parse_checksummed(s, None).map_err(|e| format!("`{s}`: {e}"))
    } else {
        Address::from_str(s).map_err(|e| format!("`{s}`: {e}"))
    }
}

impl ParamType {
    /// Canonical host value for `value`, applying the accepted input
    /// coercions. The error is a human-readable reason.
    pub fn normalize(&self, value: &Value) -> std::result::Result<Value, String> {
        let mismatch = || format!("expected {self}, got {}", value.describe());

        match (self, value) {
            (ParamType::Address | ParamType::TokenAddress, Value::Address(address)) => {
                self.check_address(*address)
            }
            (ParamType::Address | ParamType::TokenAddress, Value::String(s)) => {
                self.check_address(parse_address(s)?)
            }
            (ParamType::Boolean, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (ParamType::Number, Value::Number(n)) => {
                if *n > MAX_SAFE_INTEGER {
                    Err(format!("{n} is above the safe integer range, use bigNumber"))
                } else {
                    Ok(Value::Number(*n))
                }
            }
            (ParamType::BigNumber, Value::BigNumber(n)) => Ok(Value::BigNumber(*n)),
            (ParamType::BigNumber, Value::Number(n)) => Ok(Value::BigNumber(U256::from(*n))),
            (ParamType::BigNumber, Value::String(s)) => U256::from_str(s)
                .map(Value::BigNumber)
                .map_err(|e| format!("`{s}` is not an integer: {e}")),
            (ParamType::Date, Value::Null) => Ok(Value::Null),
            // Zero on the wire reads back as an unset date, so the epoch
            // itself has no representation.
            (ParamType::Date, Value::Date(date)) => {
                if date.timestamp() <= 0 {
                    return Err(format!("{date} must be after the unix epoch"));
                }
                if date.timestamp_subsec_nanos() != 0 {
                    return Err(format!("{date} must have whole seconds"));
                }
                Ok(Value::Date(*date))
            }
            (ParamType::HexString, Value::Bytes(bytes)) => Ok(Value::Bytes(bytes.clone())),
            (ParamType::HexString, Value::String(s)) => {
                if !s.starts_with("0x") {
                    return Err(format!("`{s}` has no 0x prefix"));
                }
                alloy_primitives::hex::decode(s)
                    .map(Value::Bytes)
                    .map_err(|e| format!("`{s}` is not hex: {e}"))
            }
            (ParamType::ContentHash, Value::Null) => Ok(Value::Null),
            (ParamType::ContentHash, Value::String(s)) => content_hash_to_digest(s)
                .map(|_| Value::String(s.clone()))
                .map_err(|e| e.to_string()),
            (ParamType::Enum(enumeration), Value::String(name)) => enumeration
                .value_of(name)
                .map(|_| Value::String(name.clone()))
                .ok_or_else(|| format!("`{name}` is not a {} variant", enumeration.name())),
            (ParamType::Enum(enumeration), Value::Number(n)) => enumeration
                .variant_of(*n)
                .map(|name| Value::String(name.to_string()))
                .ok_or_else(|| format!("{n} is not a {} value", enumeration.name())),
            (ParamType::String, Value::String(s)) => Ok(Value::String(s.clone())),
            _ => Err(mismatch()),
        }
    }

    fn check_address(&self, address: Address) -> std::result::Result<Value, String> {
        if *self == ParamType::Address && !is_valid_address(&address) {
            return Err("the zero address is not a valid address".to_string());
        }
        Ok(Value::Address(address))
    }

    pub fn validate(&self, value: &Value) -> bool {
        self.normalize(value).is_ok()
    }

    pub fn encode(&self, value: &Value) -> Result<WireValue> {
        let normalized = self
            .normalize(value)
            .map_err(|reason| ContractClientError::Encoding {
                type_name: self.to_string(),
                reason,
            })?;

        let wire = match (self, normalized) {
            (_, Value::Address(address)) => WireValue::Address(address),
            (_, Value::Bool(b)) => WireValue::Bool(b),
            (ParamType::Date, Value::Null) => WireValue::Uint(U256::ZERO),
            (ParamType::Date, Value::Date(date)) => WireValue::Uint(U256::from(date.timestamp() as u64)),
            (ParamType::ContentHash, Value::Null) => WireValue::FixedBytes(B256::ZERO),
            (ParamType::ContentHash, Value::String(s)) => WireValue::FixedBytes(
                content_hash_to_digest(&s).map_err(|e| ContractClientError::Encoding {
                    type_name: self.to_string(),
                    reason: e.to_string(),
                })?,
            ),
            (ParamType::Enum(enumeration), Value::String(name)) => {
                // normalize already checked the variant exists
                let n = enumeration.value_of(&name).unwrap_or_default();
                WireValue::Uint(U256::from(n))
            }
            (_, Value::Number(n)) => WireValue::Uint(U256::from(n)),
            (_, Value::BigNumber(n)) => WireValue::Uint(n),
            (_, Value::Bytes(bytes)) => WireValue::Bytes(bytes),
            (_, Value::String(s)) => WireValue::String(s),
            (ty, other) => {
                return Err(ContractClientError::Encoding {
                    type_name: ty.to_string(),
                    reason: format!("no wire form for {}", other.describe()),
                });
            }
        };

        Ok(wire)
    }

    pub fn decode(&self, wire: &WireValue) -> Result<Value> {
        let mismatch = || {
            ContractClientError::Decoding(format!("expected {self}, contract returned {:?}", wire))
        };

        let value = match (self, wire) {
            (_, WireValue::Array(items)) => {
                return match items.as_slice() {
                    [single] => self.decode(single),
                    _ => Err(ContractClientError::Decoding(format!(
                        "expected a single {self}, contract returned {} values",
                        items.len()
                    ))),
                };
            }
            (ParamType::Address | ParamType::TokenAddress, WireValue::Address(address)) => {
                Value::Address(*address)
            }
            (ParamType::Boolean, WireValue::Bool(b)) => Value::Bool(*b),
            (ParamType::Number, WireValue::Uint(n)) => match u256_to_u64(*n) {
                Some(n) if n <= MAX_SAFE_INTEGER => Value::Number(n),
                _ => {
                    return Err(ContractClientError::Decoding(format!(
                        "{n} does not fit a number, declare it as bigNumber"
                    )));
                }
            },
            (ParamType::BigNumber, WireValue::Uint(n)) => Value::BigNumber(*n),
            (ParamType::Date, WireValue::Uint(n)) if n.is_zero() => Value::Null,
            (ParamType::Date, WireValue::Uint(n)) => u256_to_u64(*n)
                .and_then(|secs| i64::try_from(secs).ok())
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .map(Value::Date)
                .ok_or_else(|| ContractClientError::Decoding(format!("{n} is not a date")))?,
            (ParamType::HexString, WireValue::Bytes(bytes)) => Value::Bytes(bytes.clone()),
            (ParamType::HexString, WireValue::FixedBytes(word)) => Value::Bytes(word.to_vec()),
            (ParamType::ContentHash, WireValue::FixedBytes(digest)) if digest.is_zero() => {
                Value::Null
            }
            (ParamType::ContentHash, WireValue::FixedBytes(digest)) => {
                Value::String(digest_to_content_hash(digest))
            }
            (ParamType::Enum(enumeration), WireValue::Uint(n)) => {
                let variant = u256_to_u64(*n).and_then(|n| enumeration.variant_of(n));
                match variant {
                    Some(name) => Value::String(name.to_string()),
                    None => {
                        return Err(ContractClientError::Decoding(format!(
                            "{n} is not a {} value",
                            enumeration.name()
                        )));
                    }
                }
            }
            (ParamType::String, WireValue::String(s)) => Value::String(s.clone()),
            _ => return Err(mismatch()),
        };

        Ok(value)
    }
}

/// Maps descriptor type tags to parameter types.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, ParamType>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register("address", ParamType::Address)
            .register("boolean", ParamType::Boolean)
            .register("number", ParamType::Number)
            .register("bigNumber", ParamType::BigNumber)
            .register("date", ParamType::Date)
            .register("hexString", ParamType::HexString)
            .register("ipfsHash", ParamType::ContentHash)
            .register("contentHash", ParamType::ContentHash)
            .register("tokenAddress", ParamType::TokenAddress)
            .register("role", ParamType::Enum(Arc::new(EnumType::role())))
            .register("string", ParamType::String);
        registry
    }

    pub fn register(&mut self, tag: impl Into<String>, ty: ParamType) -> &mut Self {
        self.types.insert(tag.into(), ty);
        self
    }

    pub fn register_enum<S: Into<String>>(
        &mut self,
        tag: &str,
        variants: impl IntoIterator<Item = (S, u64)>,
    ) -> Result<&mut Self> {
        let enumeration = EnumType::new(tag, variants)?;
        Ok(self.register(tag, ParamType::Enum(Arc::new(enumeration))))
    }

    pub fn resolve(&self, tag: &str) -> Option<&ParamType> {
        self.types.get(tag)
    }

    fn lookup(&self, tag: &str) -> Result<&ParamType> {
        self.resolve(tag)
            .ok_or_else(|| ContractClientError::construction(format!("unknown type `{tag}`")))
    }

    pub fn validate(&self, tag: &str, value: &Value) -> bool {
        self.resolve(tag).is_some_and(|ty| ty.validate(value))
    }

    pub fn encode(&self, tag: &str, value: &Value) -> Result<WireValue> {
        self.lookup(tag)?.encode(value)
    }

    pub fn decode(&self, tag: &str, wire: &WireValue) -> Result<Value> {
        self.lookup(tag)?.decode(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SPEC_HASH: &str = "QmcNbGg6EVfFn2Z1QxWauR9XY9KhnEcyb5DUXCXHi8pwMJ";

    fn round_trip(registry: &TypeRegistry, tag: &str, value: Value) {
        let wire = registry.encode(tag, &value).expect("encodes");
        assert_eq!(registry.decode(tag, &wire).expect("decodes"), value, "{tag}");
    }

    #[test]
    fn test_round_trip_every_type() {
        let registry = TypeRegistry::with_defaults();
        let date = Utc.with_ymd_and_hms(2018, 6, 1, 12, 30, 0).unwrap();

        round_trip(&registry, "address", Value::Address(Address::repeat_byte(0xab)));
        round_trip(&registry, "boolean", Value::Bool(true));
        round_trip(&registry, "number", Value::Number(MAX_SAFE_INTEGER));
        round_trip(&registry, "bigNumber", Value::BigNumber(U256::MAX));
        round_trip(&registry, "date", Value::Date(date));
        round_trip(&registry, "date", Value::Null);
        round_trip(&registry, "hexString", Value::Bytes(vec![0x01, 0xff]));
        round_trip(&registry, "ipfsHash", Value::String(SPEC_HASH.to_string()));
        round_trip(&registry, "ipfsHash", Value::Null);
        round_trip(&registry, "tokenAddress", Value::Address(Address::ZERO));
        round_trip(&registry, "role", Value::String("EVALUATOR".to_string()));
        round_trip(&registry, "string", Value::String("salt".to_string()));
    }

    #[test]
    fn test_date_rejects_values_without_wire_form() {
        let registry = TypeRegistry::with_defaults();
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        let fractional = Utc.timestamp_opt(1_529_999_999, 500_000_000).unwrap();
        let before_epoch = Utc.timestamp_opt(-60, 0).unwrap();

        for date in [epoch, fractional, before_epoch] {
            assert!(!registry.validate("date", &Value::Date(date)), "{date}");
            assert!(matches!(
                registry.encode("date", &Value::Date(date)),
                Err(ContractClientError::Encoding { .. })
            ));
        }
        round_trip(&registry, "date", Value::Date(Utc.timestamp_opt(1, 0).unwrap()));
    }

    #[test]
    fn test_role_decoding() {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(
            registry.decode("role", &WireValue::Uint(U256::from(2u8))).unwrap(),
            Value::String("WORKER".to_string())
        );
        assert!(matches!(
            registry.decode("role", &WireValue::Uint(U256::from(9u8))),
            Err(ContractClientError::Decoding(_))
        ));
    }

    #[test]
    fn test_custom_enum() -> Result<()> {
        let mut registry = TypeRegistry::with_defaults();
        registry.register_enum("taskStatus", [("ACTIVE", 0), ("CANCELLED", 1), ("FINALIZED", 2)])?;

        assert_eq!(
            registry.decode("taskStatus", &WireValue::Uint(U256::from(1u8)))?,
            Value::String("CANCELLED".to_string())
        );
        assert!(registry.register_enum("broken", [("A", 0), ("B", 0)]).is_err());
        Ok(())
    }

    #[test]
    fn test_address_rules() {
        let registry = TypeRegistry::with_defaults();
        let checksummed = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
        let bad_checksum = "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

        assert!(registry.validate("address", &Value::from(checksummed)));
        assert!(registry.validate("address", &Value::from(checksummed.to_lowercase())));
        assert!(!registry.validate("address", &Value::from(bad_checksum)));
        assert!(!registry.validate("address", &Value::Address(Address::ZERO)));
        assert!(registry.validate("tokenAddress", &Value::Address(Address::ZERO)));
        assert!(!registry.validate("address", &Value::from("f39fd6e51aad88f6f4ce6ab8827279cfffb92266")));
    }

    #[test]
    fn test_number_bounds() {
        let registry = TypeRegistry::with_defaults();
        assert!(!registry.validate("number", &Value::Number(MAX_SAFE_INTEGER + 1)));
        assert!(registry.validate("bigNumber", &Value::Number(MAX_SAFE_INTEGER + 1)));

        let too_big = WireValue::Uint(U256::from(MAX_SAFE_INTEGER) + U256::from(1u8));
        assert!(registry.decode("number", &too_big).is_err());
        assert_eq!(
            registry.decode("bigNumber", &too_big).unwrap(),
            Value::BigNumber(U256::from(MAX_SAFE_INTEGER) + U256::from(1u8))
        );
    }

    #[test]
    fn test_input_coercions() -> Result<()> {
        let registry = TypeRegistry::with_defaults();
        assert_eq!(
            registry.encode("bigNumber", &Value::from("1000000000000000000000"))?,
            WireValue::Uint(U256::from(10u8).pow(U256::from(21u8)))
        );
        assert_eq!(
            registry.encode("hexString", &Value::from("0xbeef"))?,
            WireValue::Bytes(vec![0xbe, 0xef])
        );
        assert!(matches!(
            registry.encode("hexString", &Value::from("beef")),
            Err(ContractClientError::Encoding { .. })
        ));
        assert_eq!(
            registry.encode("role", &Value::from("MANAGER"))?,
            WireValue::Uint(U256::ZERO)
        );
        Ok(())
    }

    #[test]
    fn test_single_element_array_collapses() -> Result<()> {
        let registry = TypeRegistry::with_defaults();
        let wire = WireValue::Array(vec![WireValue::Uint(U256::from(4u8))]);
        assert_eq!(registry.decode("number", &wire)?, Value::Number(4));

        let wire = WireValue::Array(vec![]);
        assert!(registry.decode("number", &wire).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_tag() {
        let registry = TypeRegistry::with_defaults();
        assert!(!registry.validate("uint8[]", &Value::Number(1)));
        assert!(matches!(
            registry.encode("uint8[]", &Value::Number(1)),
            Err(ContractClientError::Construction(_))
        ));
    }
}
