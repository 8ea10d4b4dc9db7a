use rust_embed::RustEmbed;

/// SQL migrations embedded into the binary so deployments never depend on a
/// migrations directory being present next to the executable.
#[derive(RustEmbed)]
#[folder = "migrations/"]
pub struct MigrationAssets;

impl MigrationAssets {
    /// All embedded migrations as (filename, content) pairs, ordered by
    /// filename so numeric prefixes apply in sequence.
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut migrations: Vec<(String, String)> = Self::iter()
            .filter(|name| name.ends_with(".sql"))
            .filter_map(|name| {
                Self::get(name.as_ref()).map(|file| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(file.data.as_ref()).into_owned(),
                    )
                })
            })
            .collect();
        migrations.sort_by(|a, b| a.0.cmp(&b.0));
        migrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let migrations = MigrationAssets::get_migrations();
        assert!(!migrations.is_empty());
        assert!(migrations[0].0.starts_with("001_"));
        assert!(migrations.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    }
}
