use crate::records::AgentRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The four categorical columns the operator can filter on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilterAttribute {
    Location,
    Division,
    Department,
    Manager,
}

impl FilterAttribute {
    pub const ALL: [FilterAttribute; 4] = [
        FilterAttribute::Location,
        FilterAttribute::Division,
        FilterAttribute::Department,
        FilterAttribute::Manager,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FilterAttribute::Location => "State/Location",
            FilterAttribute::Division => "Division",
            FilterAttribute::Department => "Department",
            FilterAttribute::Manager => "Manager",
        }
    }

    /// Trimmed value of this attribute on `record`, `""` when absent.
    pub fn value_of<'a>(&self, record: &'a AgentRecord) -> &'a str {
        let raw = match self {
            FilterAttribute::Location => record.state_location.as_deref(),
            FilterAttribute::Division => record.division.as_deref(),
            FilterAttribute::Department => record.department.as_deref(),
            FilterAttribute::Manager => record.manager_name.as_deref(),
        };

        raw.unwrap_or("").trim()
    }
}

/// Selected values per attribute. An empty set places no constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub location: BTreeSet<String>,
    pub division: BTreeSet<String>,
    pub department: BTreeSet<String>,
    pub manager: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self, attribute: FilterAttribute) -> &BTreeSet<String> {
        match attribute {
            FilterAttribute::Location => &self.location,
            FilterAttribute::Division => &self.division,
            FilterAttribute::Department => &self.department,
            FilterAttribute::Manager => &self.manager,
        }
    }

    fn values_mut(&mut self, attribute: FilterAttribute) -> &mut BTreeSet<String> {
        match attribute {
            FilterAttribute::Location => &mut self.location,
            FilterAttribute::Division => &mut self.division,
            FilterAttribute::Department => &mut self.department,
            FilterAttribute::Manager => &mut self.manager,
        }
    }

    /// Overwrites the selection for one attribute.
    pub fn set<I, S>(&mut self, attribute: FilterAttribute, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.values_mut(attribute) = values
            .into_iter()
            .map(|v| v.into().trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
    }

    /// Adds `value` if absent, removes it otherwise. Returns whether it is now selected.
    pub fn toggle(&mut self, attribute: FilterAttribute, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }

        let set = self.values_mut(attribute);

        if set.remove(value) {
            false
        } else {
            set.insert(value.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        for attribute in FilterAttribute::ALL {
            self.values_mut(attribute).clear();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }

    /// Total number of selected values across every attribute.
    pub fn active_count(&self) -> usize {
        FilterAttribute::ALL
            .iter()
            .map(|attribute| self.values(*attribute).len())
            .sum()
    }
}

/// AND across attributes, OR within one attribute's selected values.
pub fn matches(record: &AgentRecord, criteria: &FilterCriteria) -> bool {
    FilterAttribute::ALL.iter().all(|attribute| {
        let selected = criteria.values(*attribute);
        selected.is_empty() || selected.contains(attribute.value_of(record))
    })
}

/// Distinct, sorted, non-empty values offered by the filter panel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub location: Vec<String>,
    pub division: Vec<String>,
    pub department: Vec<String>,
    pub manager: Vec<String>,
}

impl FilterOptions {
    pub fn from_records(records: &[AgentRecord]) -> Self {
        let collect = |attribute: FilterAttribute| -> Vec<String> {
            records
                .iter()
                .map(|record| attribute.value_of(record))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect()
        };

        FilterOptions {
            location: collect(FilterAttribute::Location),
            division: collect(FilterAttribute::Division),
            department: collect(FilterAttribute::Department),
            manager: collect(FilterAttribute::Manager),
        }
    }

    pub fn for_attribute(&self, attribute: FilterAttribute) -> &[String] {
        match attribute {
            FilterAttribute::Location => &self.location,
            FilterAttribute::Division => &self.division,
            FilterAttribute::Department => &self.department,
            FilterAttribute::Manager => &self.manager,
        }
    }
}
