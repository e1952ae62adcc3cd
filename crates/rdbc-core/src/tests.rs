#[cfg(test)]
mod tests {
    use crate::convert::{Arg, Converter, TypeConverterRegistry};
    use crate::decimal::Decimal;
    use crate::error::{ErrorCategory, RdbcError};
    use crate::numeric::SqlNumeric;
    use crate::param::SqlParam;
    use crate::row::{ColumnMetadata, Row, RowMetadata};
    use crate::types::{SqlType, SqlValue};
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn registry() -> TypeConverterRegistry {
        TypeConverterRegistry::standard()
    }

    fn row(columns: &[&str], values: Vec<SqlValue>) -> Row {
        let metadata = RowMetadata::new(
            columns
                .iter()
                .map(|name| ColumnMetadata::new(*name, "TEXT"))
                .collect(),
        );
        Row::new(Arc::new(metadata), values, Arc::new(registry()))
    }

    #[test]
    fn native_values_convert_to_themselves() {
        let registry = registry();
        let instant = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("date");
        let time = NaiveTime::from_hms_opt(23, 59, 1).expect("time");
        let uuid = Uuid::new_v4();

        assert!(registry.convert::<bool>(&SqlValue::Bool(true)).expect("bool"));
        assert_eq!(registry.convert::<char>(&SqlValue::Char('x')).expect("char"), 'x');
        assert_eq!(registry.convert::<i16>(&SqlValue::Int16(-7)).expect("i16"), -7);
        assert_eq!(registry.convert::<i32>(&SqlValue::Int32(42)).expect("i32"), 42);
        assert_eq!(registry.convert::<i64>(&SqlValue::Int64(i64::MAX)).expect("i64"), i64::MAX);
        assert_eq!(registry.convert::<f32>(&SqlValue::Float32(1.5)).expect("f32"), 1.5);
        assert_eq!(registry.convert::<f64>(&SqlValue::Float64(-2.25)).expect("f64"), -2.25);
        let decimal: Decimal = "12.345".parse().expect("decimal");
        assert_eq!(
            registry.convert::<Decimal>(&SqlValue::Decimal(decimal)).expect("decimal"),
            decimal
        );
        assert_eq!(
            registry
                .convert::<SqlNumeric>(&SqlValue::Numeric(SqlNumeric::NaN))
                .expect("numeric"),
            SqlNumeric::NaN
        );
        assert_eq!(
            registry.convert::<String>(&SqlValue::String("abc".into())).expect("string"),
            "abc"
        );
        assert_eq!(
            registry.convert::<Vec<u8>>(&SqlValue::Bytes(vec![1, 2, 3])).expect("bytes"),
            vec![1, 2, 3]
        );
        assert_eq!(registry.convert::<Uuid>(&SqlValue::Uuid(uuid)).expect("uuid"), uuid);
        assert_eq!(
            registry
                .convert::<chrono::DateTime<Utc>>(&SqlValue::Instant(instant))
                .expect("instant"),
            instant
        );
        assert_eq!(
            registry
                .convert::<chrono::NaiveDateTime>(&SqlValue::LocalDateTime(instant.naive_utc()))
                .expect("local date-time"),
            instant.naive_utc()
        );
        assert_eq!(registry.convert::<NaiveDate>(&SqlValue::Date(date)).expect("date"), date);
        assert_eq!(registry.convert::<NaiveTime>(&SqlValue::Time(time)).expect("time"), time);
    }

    #[test]
    fn numeric_narrowing_truncates_and_wraps() {
        let registry = registry();
        let value: Decimal = "-3.99".parse().expect("decimal");
        assert_eq!(registry.convert::<i32>(&SqlValue::Decimal(value)).expect("i32"), -3);
        assert_eq!(registry.convert::<i64>(&SqlValue::Float64(7.9)).expect("i64"), 7);
        assert_eq!(registry.convert::<i16>(&SqlValue::Int32(65_537)).expect("i16"), 1);
        assert_eq!(registry.convert::<i32>(&SqlValue::String("12".into())).expect("i32"), 12);
        assert!(matches!(
            registry.convert::<i32>(&SqlValue::Float64(f64::NAN)),
            Err(RdbcError::Conversion(_))
        ));
        assert!(matches!(
            registry.convert::<i32>(&SqlValue::Bool(true)),
            Err(RdbcError::Conversion(_))
        ));
    }

    #[test]
    fn uuid_from_string_requires_canonical_form() {
        let registry = registry();
        let uuid = Uuid::new_v4();
        assert_eq!(
            registry
                .convert::<Uuid>(&SqlValue::String(uuid.to_string()))
                .expect("canonical"),
            uuid
        );
        let simple = uuid.simple().to_string();
        assert!(registry.convert::<Uuid>(&SqlValue::String(simple)).is_err());
        assert!(registry
            .convert::<Uuid>(&SqlValue::String("not-a-uuid".into()))
            .is_err());
        assert_eq!(
            registry
                .convert::<Uuid>(&SqlValue::Bytes(uuid.as_bytes().to_vec()))
                .expect("bytes"),
            uuid
        );
    }

    #[test]
    fn char_requires_single_character_string() {
        let registry = registry();
        assert_eq!(registry.convert::<char>(&SqlValue::String("z".into())).expect("char"), 'z');
        assert!(registry.convert::<char>(&SqlValue::String("zz".into())).is_err());
        assert!(registry.convert::<char>(&SqlValue::String(String::new())).is_err());
    }

    #[test]
    fn bool_accepts_textual_forms() {
        let registry = registry();
        assert!(registry.convert::<bool>(&SqlValue::String("t".into())).expect("t"));
        assert!(!registry.convert::<bool>(&SqlValue::Int32(0)).expect("0"));
        assert!(registry.convert::<bool>(&SqlValue::Int32(2)).is_err());
    }

    struct UpperConverter;

    impl Converter for UpperConverter {
        type Target = String;

        fn convert(&self, value: &SqlValue) -> crate::Result<String> {
            Ok(value.to_string().to_uppercase())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry.register(UpperConverter).expect_err("duplicate");
        assert!(matches!(err, RdbcError::DuplicateConverter(_)));
        assert_eq!(err.category(), ErrorCategory::Conversion);

        assert!(registry.register_or_replace(UpperConverter));
        assert_eq!(
            registry.convert::<String>(&SqlValue::String("abc".into())).expect("upper"),
            "ABC"
        );
    }

    #[test]
    fn empty_registry_has_no_converters() {
        let mut registry = TypeConverterRegistry::new();
        assert!(registry.lookup::<String>().is_none());
        assert!(matches!(
            registry.convert::<String>(&SqlValue::String("x".into())),
            Err(RdbcError::Conversion(_))
        ));
        registry.register(UpperConverter).expect("register");
        assert!(registry.lookup::<String>().is_some());
    }

    #[test]
    fn encode_resolves_host_types() {
        let registry = registry();
        let bound = registry.encode("id", &Arg::new(5i64)).expect("i64");
        assert_eq!(bound.value, SqlValue::Int64(5));
        assert_eq!(bound.sql_type, Some(SqlType::Int64));

        let bound = registry.encode("name", &Arg::new("bob")).expect("str");
        assert_eq!(bound.value, SqlValue::String("bob".into()));

        let bound = registry.encode("n", &Arg::new(None::<i32>)).expect("typed null");
        assert_eq!(bound.value, SqlValue::Null);
        assert_eq!(bound.sql_type, Some(SqlType::Int32));

        let bound = registry
            .encode("p", &Arg::new(SqlParam::null(SqlType::Uuid)))
            .expect("sql param");
        assert_eq!(bound.value, SqlValue::Null);
        assert_eq!(bound.sql_type, Some(SqlType::Uuid));
    }

    #[test]
    fn encode_unknown_host_type_fails() {
        struct Opaque;
        let registry = registry();
        let err = registry.encode("x", &Arg::new(Opaque)).expect_err("no encoder");
        match err {
            RdbcError::NoSuitableConverter { param, type_name } => {
                assert_eq!(param, "x");
                assert!(type_name.contains("Opaque"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn row_accessors_by_name_and_index() {
        let row = row(
            &["id", "name", "nick"],
            vec![
                SqlValue::Int64(1),
                SqlValue::String("alice".into()),
                SqlValue::Null,
            ],
        );
        assert_eq!(row.get_i64(0).expect("by index"), 1);
        assert_eq!(row.get_i32("id").expect("narrowed"), 1);
        assert_eq!(row.get_str("name").expect("name"), "alice");
        assert_eq!(row.get_str_opt("nick").expect("nick"), None);
        assert!(matches!(row.get_str("nick"), Err(RdbcError::Conversion(_))));
        assert!(matches!(row.get_str("missing"), Err(RdbcError::NoSuchColumn(_))));
        assert!(matches!(row.value(3), Err(RdbcError::NoSuchColumn(_))));
        let column = String::from("name");
        assert_eq!(row.value(&column).expect("string key"), &SqlValue::String("alice".into()));
    }

    #[test]
    fn numeric_special_values() {
        let row = row(
            &["n", "d"],
            vec![
                SqlValue::Numeric(SqlNumeric::PositiveInfinity),
                SqlValue::Numeric(SqlNumeric::Finite(Decimal::new(150, 2))),
            ],
        );
        let n = row.get_numeric("n").expect("numeric");
        assert!(n.is_positive_infinity());
        assert!(matches!(n.value(), Err(RdbcError::InvalidState(_))));
        assert!(row.get_decimal("n").is_err());
        assert_eq!(row.get_decimal("d").expect("decimal"), Decimal::new(15, 1));
    }

    #[test]
    fn float_to_numeric_fails_instead_of_nan() {
        let registry = registry();
        let tiny = registry
            .convert::<SqlNumeric>(&SqlValue::Float64(1e-40))
            .expect("tiny");
        assert_eq!(tiny, SqlNumeric::Finite(Decimal::ZERO));
        let small = registry
            .convert::<SqlNumeric>(&SqlValue::Float64(2.5e-7))
            .expect("small");
        assert_eq!(small, SqlNumeric::Finite(Decimal::new(25, 8)));
        assert!(matches!(
            registry.convert::<SqlNumeric>(&SqlValue::Float64(1e300)),
            Err(RdbcError::Conversion(_))
        ));
        assert!(matches!(
            registry.convert::<Decimal>(&SqlValue::Float64(-1e300)),
            Err(RdbcError::Conversion(_))
        ));
        assert!(registry
            .convert::<SqlNumeric>(&SqlValue::Float64(f64::NAN))
            .expect("nan")
            .is_nan());
    }

    #[test]
    fn string_with_extreme_exponent_is_a_conversion_error() {
        let registry = registry();
        for text in ["1e-9223372036854775808", "1e9223372036854775807"] {
            assert!(matches!(
                registry.convert::<Decimal>(&SqlValue::String(text.into())),
                Err(RdbcError::Conversion(_))
            ));
        }
    }
}
