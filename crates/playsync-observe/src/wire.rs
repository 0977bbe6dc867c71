//! Serde helpers for values JSON cannot carry natively.

/// Serialize an `f64` so that `NaN` and infinities survive a JSON round
/// trip: finite values stay numbers, the others become the strings `"NaN"`,
/// `"Infinity"` and `"-Infinity"`.
pub mod non_finite_f64 {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_sign_positive() {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum Repr {
        Number(f64),
        Text(String),
    }

    impl Repr {
        pub(super) fn into_f64<E: de::Error>(self) -> Result<f64, E> {
            match self {
                Repr::Number(n) => Ok(n),
                Repr::Text(s) => match s.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "Infinity" => Ok(f64::INFINITY),
                    "-Infinity" => Ok(f64::NEG_INFINITY),
                    other => Err(E::invalid_value(
                        de::Unexpected::Str(other),
                        &"a number, \"NaN\", \"Infinity\" or \"-Infinity\"",
                    )),
                },
            }
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Repr::deserialize(deserializer)?.into_f64()
    }
}

/// [`non_finite_f64`] for optional values; `None` stays `null`.
pub mod non_finite_opt_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::non_finite_f64::{self, Repr};

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => non_finite_f64::serialize(v, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::into_f64)
            .transpose()
    }
}
