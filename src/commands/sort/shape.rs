/// How a table participates in sorting and validation, decided once from
/// its column list. The four cases cover the whole period/vintage
/// combination space, so classification never fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum TableShape {
    PeriodVintage,
    PeriodOnly { has_tech: bool },
    VintageOnly,
    Unclassified,
}

impl TableShape {
    pub(super) fn classify(columns: &[String]) -> Self {
        let has = |name: &str| columns.iter().any(|column| column == name);

        match (has("period"), has("vintage")) {
            (true, true) => Self::PeriodVintage,
            (true, false) => Self::PeriodOnly {
                has_tech: has("tech"),
            },
            (false, true) => Self::VintageOnly,
            (false, false) => Self::Unclassified,
        }
    }

    pub(super) fn sort_columns(self) -> &'static [&'static str] {
        match self {
            Self::PeriodVintage => &["region", "tech", "period", "vintage"],
            Self::PeriodOnly { has_tech: true } => &["region", "tech", "period"],
            Self::PeriodOnly { has_tech: false } => &["region", "period"],
            Self::VintageOnly => &["region", "tech", "vintage"],
            Self::Unclassified => &[],
        }
    }

    /// The sort key restricted to columns the table actually has. An empty
    /// result means the table is left untouched.
    pub(super) fn effective_sort_columns(self, columns: &[String]) -> Vec<&'static str> {
        self.sort_columns()
            .iter()
            .copied()
            .filter(|key| columns.iter().any(|column| column == key))
            .collect()
    }
}
