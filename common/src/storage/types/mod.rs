use serde::{Deserialize, Serialize};
pub mod book;
pub mod dependency;
pub mod sentence;
pub mod token;

/// A row of one of the corpus tables, keyed by an integer surrogate id.
pub trait CorpusRecord: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn record_key(&self) -> i64;
}

/// Declares a corpus record struct with the `id` and `created_at` columns every
/// table shares.
///
/// `id` is never serialized: it lives in the record id (`book:7`), and writes
/// address it with `type::thing(table, id)`.
#[macro_export]
macro_rules! corpus_record {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),*}) => {
        use serde::{Deserialize, Deserializer, Serialize};
        use surrealdb::sql::{Id, Thing};
        use $crate::storage::types::CorpusRecord;
        use serde::de::{self, Visitor};
        use std::fmt;
        use chrono::{DateTime, Utc};

        struct RecordKeyVisitor;

        impl<'de> Visitor<'de> for RecordKeyVisitor {
            type Value = i64;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an integer or a Thing with an integer key")
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(value)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                i64::try_from(value).map_err(E::custom)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                let key = value.rsplit(':').next().unwrap_or(value);
                key.parse::<i64>().map_err(E::custom)
            }

            fn visit_map<A>(self, map: A) -> Result<Self::Value, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                // Try to deserialize as Thing
                let thing = Thing::deserialize(de::value::MapAccessDeserializer::new(map))?;
                match thing.id {
                    Id::Number(key) => Ok(key),
                    other => other.to_raw().parse::<i64>().map_err(de::Error::custom),
                }
            }
        }

        fn deserialize_record_key<'de, D>(deserializer: D) -> Result<i64, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(RecordKeyVisitor)
        }

        fn serialize_datetime<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Into::<surrealdb::sql::Datetime>::into(*date).serialize(serializer)
        }

        fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let dt = surrealdb::sql::Datetime::deserialize(deserializer)?;
            Ok(DateTime::<Utc>::from(dt))
        }

        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub struct $name {
            #[serde(skip_serializing, deserialize_with = "deserialize_record_key")]
            pub id: i64,
            #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime", default)]
            pub created_at: DateTime<Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl CorpusRecord for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn record_key(&self) -> i64 {
                self.id
            }
        }
    };
}
