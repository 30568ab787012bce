use std::collections::HashMap;

/// Standard durations for the clinic's procedures, in minutes.
///
/// Immutable after construction; the booking service gets its own instance
/// so tests can swap the table.
pub struct ProcedureCatalog {
    durations: HashMap<String, i64>,
    default_minutes: i64,
}

impl Default for ProcedureCatalog {
    fn default() -> Self {
        Self::with_entries(
            &[
                ("Muayene", 30),
                ("Diş Taşı Temizliği", 30),
                ("Diş Çekimi", 30),
                ("Dolgu", 45),
                ("Kanal Tedavisi", 60),
                ("İmplant", 90),
            ],
            30,
        )
    }
}

impl ProcedureCatalog {
    pub fn with_entries(entries: &[(&str, i64)], default_minutes: i64) -> Self {
        let durations = entries
            .iter()
            .map(|(name, minutes)| (name.to_string(), *minutes))
            .collect();
        Self {
            durations,
            default_minutes,
        }
    }

    /// Unknown procedure names are not an error; they get the default slot.
    pub fn duration_minutes(&self, procedure: &str) -> i64 {
        self.durations
            .get(procedure)
            .copied()
            .unwrap_or(self.default_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_procedures_use_their_standard_duration() {
        let catalog = ProcedureCatalog::default();
        assert_eq!(catalog.duration_minutes("Muayene"), 30);
        assert_eq!(catalog.duration_minutes("Dolgu"), 45);
        assert_eq!(catalog.duration_minutes("Kanal Tedavisi"), 60);
        assert_eq!(catalog.duration_minutes("İmplant"), 90);
    }

    #[test]
    fn unknown_procedure_falls_back_to_default() {
        let catalog = ProcedureCatalog::default();
        assert_eq!(catalog.duration_minutes("Beyazlatma"), 30);
    }

    #[test]
    fn custom_table_overrides_the_default() {
        let catalog = ProcedureCatalog::with_entries(&[("Kontrol", 15)], 20);
        assert_eq!(catalog.duration_minutes("Kontrol"), 15);
        assert_eq!(catalog.duration_minutes("Muayene"), 20);
    }
}
