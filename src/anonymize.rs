// ABOUTME: Deterministic per-column value rewriting for sensitive data
// ABOUTME: Equal inputs under one run seed produce equal fakes; FK columns pass through

use crate::config::AnonymizeConfig;
use crate::schema::{SchemaModel, SensitivityTag, TableId};
use crate::value::SqlValue;
use anyhow::{Context, Result};
use fake::faker::address::en::{CityName, StateName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::{Sentence, Word};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::RegexBuilder;
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

/// Default column-name patterns mapped to fake methods. Case-insensitive;
/// first match wins. The method names here are the user-visible vocabulary
/// accepted by `anonymize.fields`.
const DEFAULT_FAKE_PATTERNS: &[(&str, &str)] = &[
    (r"^email$|email_|_email", "email"),
    (r"phone|mobile|fax", "phone_number"),
    (r"^ssn$|social_security|national_id", "ssn"),
    (r"first_name|given_name", "first_name"),
    (r"last_name|surname|family_name", "last_name"),
    (r"full_name|^name$", "full_name"),
    (r"street|address", "street_address"),
    (r"^city$", "city"),
    (r"^state$|province", "state"),
    (r"zip|postal", "zip"),
    (r"company|organization|employer", "company"),
    (r"username|user_name|login", "username"),
    (r"^ip$|ip_address", "ip"),
];

/// Authentication material is never faked, only removed.
const DEFAULT_NULL_PATTERNS: &[&str] = &[
    r"password|passwd",
    r"secret",
    r"token",
    r"api_key",
    r"auth",
    r"credential",
    r"private_key|session_key",
];

/// Compiled sensitivity rule set: explicit `table.column -> method`
/// assignments from config, plus name-pattern defaults.
pub struct SensitivityRules {
    explicit: BTreeMap<(String, String), String>,
    null_patterns: Vec<regex::Regex>,
    fake_patterns: Vec<(regex::Regex, String)>,
}

impl SensitivityRules {
    pub fn from_config(config: &AnonymizeConfig) -> Result<Self> {
        let mut explicit = BTreeMap::new();
        for (field, method) in &config.fields {
            let (table, column) = field
                .split_once('.')
                .context("anonymize.fields keys are table.column")?;
            explicit.insert((table.to_string(), column.to_string()), method.clone());
        }

        let null_sources: Vec<&str> = if config.null_fields.is_empty() {
            DEFAULT_NULL_PATTERNS.to_vec()
        } else {
            config.null_fields.iter().map(String::as_str).collect()
        };
        let null_patterns = null_sources
            .iter()
            .map(|p| compile_pattern(p))
            .collect::<Result<Vec<_>>>()?;

        let fake_patterns = DEFAULT_FAKE_PATTERNS
            .iter()
            .map(|(p, method)| Ok((compile_pattern(p)?, method.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(SensitivityRules {
            explicit,
            null_patterns,
            fake_patterns,
        })
    }

    /// Tag for one column. Explicit config beats the NULL_OUT patterns,
    /// which beat the fake-method patterns.
    pub fn tag(&self, table: &str, column: &str) -> SensitivityTag {
        if let Some(method) = self
            .explicit
            .get(&(table.to_string(), column.to_string()))
        {
            return SensitivityTag::Fake(method.clone());
        }
        if self.null_patterns.iter().any(|p| p.is_match(column)) {
            return SensitivityTag::NullOut;
        }
        for (pattern, method) in &self.fake_patterns {
            if pattern.is_match(column) {
                return SensitivityTag::Fake(method.clone());
            }
        }
        SensitivityTag::None
    }

    /// Fill in the per-column sensitivity tags across the whole model.
    pub fn annotate(&self, model: &mut SchemaModel) {
        for table in model.tables_mut() {
            let name = table.name.clone();
            table.sensitivity = table
                .columns
                .iter()
                .map(|c| self.tag(&name, &c.name))
                .collect();
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<regex::Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("invalid sensitivity pattern '{}'", pattern))
}

/// Stateless value rewriter applied while emitting.
///
/// Determinism comes from keying every fake off
/// `HMAC-SHA256(run seed, canonical value bytes)`: equal raw values under
/// the same method yield equal output in any table, which preserves
/// equality joins without preserving the data.
pub struct Anonymizer {
    enabled: bool,
    seed: String,
}

impl Anonymizer {
    pub fn new(enabled: bool, seed: String) -> Self {
        Anonymizer { enabled, seed }
    }

    pub fn disabled() -> Self {
        Anonymizer::new(false, String::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The value to emit for `(table, column, raw)`.
    pub fn emit_value(
        &self,
        schema: &SchemaModel,
        table: TableId,
        column: usize,
        raw: &SqlValue,
    ) -> SqlValue {
        if !self.enabled || raw.is_null() {
            return raw.clone();
        }
        // Columns participating in any FK carry referential identity and
        // pass through unchanged regardless of tags.
        if schema.column_in_fk(table, column) {
            return raw.clone();
        }
        match &schema.table(table).sensitivity[column] {
            SensitivityTag::NullOut => SqlValue::Null,
            SensitivityTag::Fake(method) => fake_value(method, self.keyed_hash(raw)),
            SensitivityTag::None => raw.clone(),
        }
    }

    fn keyed_hash(&self, raw: &SqlValue) -> [u8; 32] {
        hmac_sha256(self.seed.as_bytes(), &raw.canonical_bytes())
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Generate the fake for a method from a 32-byte derivation. Unknown
/// methods degrade to an opaque deterministic token.
pub fn fake_value(method: &str, seed: [u8; 32]) -> SqlValue {
    let mut rng = StdRng::from_seed(seed);
    let text = match method.to_lowercase().as_str() {
        "email" | "safe_email" => SafeEmail().fake_with_rng(&mut rng),
        "phone" | "phone_number" => PhoneNumber().fake_with_rng(&mut rng),
        "first_name" => FirstName().fake_with_rng(&mut rng),
        "last_name" => LastName().fake_with_rng(&mut rng),
        "name" | "full_name" => Name().fake_with_rng(&mut rng),
        "username" | "user_name" => Username().fake_with_rng(&mut rng),
        "city" => CityName().fake_with_rng(&mut rng),
        "state" => StateName().fake_with_rng(&mut rng),
        "street_address" | "address" => {
            let number: u16 = rng.gen_range(1..2000);
            let street: String = StreetName().fake_with_rng(&mut rng);
            let city: String = CityName().fake_with_rng(&mut rng);
            let state: String = StateName().fake_with_rng(&mut rng);
            let zip: String = ZipCode().fake_with_rng(&mut rng);
            format!("{} {}, {}, {} {}", number, street, city, state, zip)
        }
        "zip" | "zip_code" | "postal_code" => ZipCode().fake_with_rng(&mut rng),
        "company" | "company_name" => CompanyName().fake_with_rng(&mut rng),
        "ssn" => format!(
            "{:03}-{:02}-{:04}",
            rng.gen_range(100..900),
            rng.gen_range(10..99),
            rng.gen_range(1000..10000)
        ),
        "ip" | "ip_address" | "ipv4" => format!(
            "{}.{}.{}.{}",
            rng.gen_range(1..255),
            rng.gen_range(0..255),
            rng.gen_range(0..255),
            rng.gen_range(1..255)
        ),
        "uuid" => {
            let mut bytes = [0u8; 16];
            rng.fill(&mut bytes[..]);
            return SqlValue::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid());
        }
        "word" => Word().fake_with_rng(&mut rng),
        "sentence" | "lorem" => Sentence(3..8).fake_with_rng(&mut rng),
        _ => format!("anon_{}", hex::encode(&seed[..8])),
    };
    SqlValue::Text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::testutil::table;

    fn rules(config: &AnonymizeConfig) -> SensitivityRules {
        SensitivityRules::from_config(config).unwrap()
    }

    #[test]
    fn default_patterns_tag_common_columns() {
        let r = rules(&AnonymizeConfig::default());
        assert_eq!(r.tag("users", "email"), SensitivityTag::Fake("email".into()));
        assert_eq!(
            r.tag("users", "billing_email"),
            SensitivityTag::Fake("email".into())
        );
        assert_eq!(
            r.tag("users", "Phone_Number"),
            SensitivityTag::Fake("phone_number".into())
        );
        assert_eq!(r.tag("users", "password_hash"), SensitivityTag::NullOut);
        assert_eq!(r.tag("users", "api_key"), SensitivityTag::NullOut);
        assert_eq!(r.tag("users", "created_at"), SensitivityTag::None);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let mut config = AnonymizeConfig::default();
        config
            .fields
            .insert("users.note".to_string(), "sentence".to_string());
        // An explicit assignment wins even over a NULL_OUT pattern.
        config
            .fields
            .insert("users.token".to_string(), "word".to_string());
        let r = rules(&config);
        assert_eq!(r.tag("users", "note"), SensitivityTag::Fake("sentence".into()));
        assert_eq!(r.tag("users", "token"), SensitivityTag::Fake("word".into()));
        assert_eq!(r.tag("orders", "token"), SensitivityTag::NullOut);
    }

    #[test]
    fn custom_null_patterns_replace_defaults() {
        let config = AnonymizeConfig {
            null_fields: vec!["^internal_".to_string()],
            ..Default::default()
        };
        let r = rules(&config);
        assert_eq!(r.tag("t", "internal_notes"), SensitivityTag::NullOut);
        // The default token pattern no longer applies.
        assert_eq!(r.tag("t", "token"), SensitivityTag::None);
    }

    #[test]
    fn fakes_are_deterministic_per_seed_and_value() {
        let a = Anonymizer::new(true, "seed-S".into());
        let raw = SqlValue::Text("a@b.c".into());
        let one = fake_value("email", a.keyed_hash(&raw));
        let two = fake_value("email", a.keyed_hash(&raw));
        assert_eq!(one, two);
        assert_ne!(one, raw);

        let other_seed = Anonymizer::new(true, "seed-T".into());
        assert_ne!(one, fake_value("email", other_seed.keyed_hash(&raw)));

        let other_value = SqlValue::Text("x@y.z".into());
        assert_ne!(one, fake_value("email", a.keyed_hash(&other_value)));
    }

    #[test]
    fn fk_columns_pass_through_unchanged() {
        let mut model = SchemaModel::default();
        let users = model.add_table(table(
            "users",
            &[("id", "int8", false), ("email", "text", true)],
            &["id"],
        ));
        let orders = model.add_table(table(
            "orders",
            &[("id", "int8", false), ("user_id", "int8", true)],
            &["id"],
        ));
        model.add_edge("orders_user_fkey".into(), orders, vec![1], users, vec![0], false);
        model.finalize();
        rules(&AnonymizeConfig::default()).annotate(&mut model);

        let anon = Anonymizer::new(true, "S".into());
        // users.id is an FK target; identical even though anonymize is on.
        assert_eq!(
            anon.emit_value(&model, users, 0, &SqlValue::Int(42)),
            SqlValue::Int(42)
        );
        // orders.user_id is an FK source.
        assert_eq!(
            anon.emit_value(&model, orders, 1, &SqlValue::Int(42)),
            SqlValue::Int(42)
        );
        // users.email is faked.
        let faked = anon.emit_value(&model, users, 1, &SqlValue::Text("a@b.c".into()));
        assert_ne!(faked, SqlValue::Text("a@b.c".into()));
    }

    #[test]
    fn null_input_stays_null() {
        let anon = Anonymizer::new(true, "S".into());
        let mut model = SchemaModel::default();
        let t = model.add_table(table("users", &[("email", "text", true)], &[]));
        rules(&AnonymizeConfig::default()).annotate(&mut model);
        assert_eq!(anon.emit_value(&model, t, 0, &SqlValue::Null), SqlValue::Null);
    }

    #[test]
    fn disabled_anonymizer_is_identity() {
        let anon = Anonymizer::disabled();
        let mut model = SchemaModel::default();
        let t = model.add_table(table("users", &[("email", "text", true)], &[]));
        rules(&AnonymizeConfig::default()).annotate(&mut model);
        let raw = SqlValue::Text("a@b.c".into());
        assert_eq!(anon.emit_value(&model, t, 0, &raw), raw);
    }

    #[test]
    fn hmac_matches_rfc4231_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let mac = hmac_sha256(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn unknown_method_degrades_deterministically() {
        let seed = [7u8; 32];
        assert_eq!(fake_value("no_such_method", seed), fake_value("no_such_method", seed));
    }
}
