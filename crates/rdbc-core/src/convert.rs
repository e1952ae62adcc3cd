use crate::converters;
use crate::decimal::Decimal;
use crate::error::{RdbcError, Result};
use crate::numeric::SqlNumeric;
use crate::param::SqlParam;
use crate::types::{SqlType, SqlValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Coerces a runtime [`SqlValue`] into `Target`.
///
/// Implementations accept a fixed set of source variants and fail with
/// `RdbcError::Conversion` for everything else.
pub trait Converter: Send + Sync + 'static {
    type Target: 'static;

    fn convert(&self, value: &SqlValue) -> Result<Self::Target>;

    fn target_name(&self) -> &'static str {
        type_name::<Self::Target>()
    }
}

/// Host value handed to `bind`; its runtime type is resolved against the
/// registry's encoders.
pub struct Arg {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Arg {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arg").field("type_name", &self.type_name).finish()
    }
}

/// Encoded parameter: the value sent to the engine plus its declared type,
/// which survives for typed NULLs.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundValue {
    pub value: SqlValue,
    pub sql_type: Option<SqlType>,
}

impl BoundValue {
    pub fn new(value: SqlValue) -> Self {
        let sql_type = value.sql_type();
        Self { value, sql_type }
    }

    pub fn typed_null(sql_type: SqlType) -> Self {
        Self {
            value: SqlValue::Null,
            sql_type: Some(sql_type),
        }
    }
}

type Encoder = Arc<dyn Fn(&dyn Any) -> Option<BoundValue> + Send + Sync>;

/// Converters keyed by target type and parameter encoders keyed by host type.
#[derive(Default)]
pub struct TypeConverterRegistry {
    // each value is an `Arc<dyn Converter<Target = T>>` keyed by `TypeId::of::<T>()`
    converters: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    converter_names: HashMap<TypeId, &'static str>,
    encoders: HashMap<TypeId, Encoder>,
}

impl TypeConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with converters for every [`SqlType`] and encoders for the
    /// usual host types.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        converters::register_standard(&mut registry);

        registry.register_scalar::<bool>(SqlType::Bool, |v| SqlValue::Bool(*v));
        registry.register_scalar::<char>(SqlType::Char, |v| SqlValue::Char(*v));
        registry.register_scalar::<i16>(SqlType::Int16, |v| SqlValue::Int16(*v));
        registry.register_scalar::<i32>(SqlType::Int32, |v| SqlValue::Int32(*v));
        registry.register_scalar::<i64>(SqlType::Int64, |v| SqlValue::Int64(*v));
        registry.register_scalar::<f32>(SqlType::Float32, |v| SqlValue::Float32(*v));
        registry.register_scalar::<f64>(SqlType::Float64, |v| SqlValue::Float64(*v));
        registry.register_scalar::<Decimal>(SqlType::Decimal, |v| SqlValue::Decimal(*v));
        registry.register_scalar::<SqlNumeric>(SqlType::Numeric, |v| SqlValue::Numeric(*v));
        registry.register_scalar::<String>(SqlType::String, |v| SqlValue::String(v.clone()));
        registry.register_scalar::<&'static str>(SqlType::String, |v| {
            SqlValue::String((*v).to_string())
        });
        registry.register_scalar::<Vec<u8>>(SqlType::Bytes, |v| SqlValue::Bytes(v.clone()));
        registry.register_scalar::<Uuid>(SqlType::Uuid, |v| SqlValue::Uuid(*v));
        registry.register_scalar::<DateTime<Utc>>(SqlType::Instant, |v| SqlValue::Instant(*v));
        registry.register_scalar::<NaiveDateTime>(SqlType::LocalDateTime, |v| {
            SqlValue::LocalDateTime(*v)
        });
        registry.register_scalar::<NaiveDate>(SqlType::Date, |v| SqlValue::Date(*v));
        registry.register_scalar::<NaiveTime>(SqlType::Time, |v| SqlValue::Time(*v));
        registry.register_encoder::<SqlValue>(|v| BoundValue::new(v.clone()));
        registry.register_encoder::<SqlParam>(|p| BoundValue {
            value: p.to_sql_value(),
            sql_type: Some(p.sql_type()),
        });
        registry
    }

    /// Registers `converter` for its target type. A second converter for the
    /// same target is rejected; use [`register_or_replace`](Self::register_or_replace)
    /// to override on purpose.
    pub fn register<C: Converter>(&mut self, converter: C) -> Result<()> {
        let id = TypeId::of::<C::Target>();
        if self.converters.contains_key(&id) {
            return Err(RdbcError::DuplicateConverter(
                converter.target_name().to_string(),
            ));
        }
        self.insert_converter(converter);
        Ok(())
    }

    /// Returns true when a previous converter for the target was replaced.
    pub fn register_or_replace<C: Converter>(&mut self, converter: C) -> bool {
        self.insert_converter(converter)
    }

    pub fn lookup<T: 'static>(&self) -> Option<Arc<dyn Converter<Target = T>>> {
        self.converters
            .get(&TypeId::of::<T>())?
            .downcast_ref::<Arc<dyn Converter<Target = T>>>()
            .cloned()
    }

    pub fn convert<T: 'static>(&self, value: &SqlValue) -> Result<T> {
        let converter = self.lookup::<T>().ok_or_else(|| {
            RdbcError::Conversion(format!("no converter registered for {}", type_name::<T>()))
        })?;
        converter.convert(value)
    }

    pub fn register_encoder<T: Any + Send + Sync>(
        &mut self,
        encode: impl Fn(&T) -> BoundValue + Send + Sync + 'static,
    ) {
        let encoder: Encoder = Arc::new(move |any: &dyn Any| any.downcast_ref::<T>().map(&encode));
        self.encoders.insert(TypeId::of::<T>(), encoder);
    }

    /// Encodes a bound argument; `param` names the placeholder for error reporting.
    pub fn encode(&self, param: &str, arg: &Arg) -> Result<BoundValue> {
        let no_converter = || RdbcError::NoSuitableConverter {
            param: param.to_string(),
            type_name: arg.type_name.to_string(),
        };
        let value: &dyn Any = arg.value.as_ref();
        let encoder = self
            .encoders
            .get(&value.type_id())
            .ok_or_else(no_converter)?;
        encoder(value).ok_or_else(no_converter)
    }

    fn insert_converter<C: Converter>(&mut self, converter: C) -> bool {
        let id = TypeId::of::<C::Target>();
        let name = converter.target_name();
        let erased: Arc<dyn Converter<Target = C::Target>> = Arc::new(converter);
        self.converter_names.insert(id, name);
        self.converters.insert(id, Box::new(erased)).is_some()
    }

    fn register_scalar<T: Any + Send + Sync>(
        &mut self,
        sql_type: SqlType,
        to_value: fn(&T) -> SqlValue,
    ) {
        self.register_encoder::<T>(move |v| BoundValue {
            value: to_value(v),
            sql_type: Some(sql_type),
        });
        self.register_encoder::<Option<T>>(move |v| match v {
            Some(v) => BoundValue {
                value: to_value(v),
                sql_type: Some(sql_type),
            },
            None => BoundValue::typed_null(sql_type),
        });
    }
}

impl fmt::Debug for TypeConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut targets: Vec<&str> = self.converter_names.values().copied().collect();
        targets.sort_unstable();
        f.debug_struct("TypeConverterRegistry")
            .field("converters", &targets)
            .field("encoders", &self.encoders.len())
            .finish()
    }
}
