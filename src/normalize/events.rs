use crate::error::{ConvertError, Result};
use crate::model::{Event, Operator, Range, RangeSpec, RangeType};

/// What an inclusive upper bound (`<= V`) turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InclusiveUpper {
    /// No event for the bound itself; the first patched version, if any,
    /// becomes `fixed`. Without a patch the range stays open-ended.
    #[default]
    FirstPatched,
    /// The bound becomes `last_affected`.
    LastAffected,
}

/// The result of normalizing one or more source ranges.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalized {
    pub range: Option<Range>,
    /// Exact affected versions with no known fix.
    pub versions: Vec<String>,
}

/// Accumulates OSV events for a single range.
///
/// GHSA folds every vulnerable range of a package into one OSV range, so
/// [`push`](Self::push) may be called several times before
/// [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct EventSequenceBuilder {
    range_type: RangeType,
    inclusive_upper: InclusiveUpper,
    events: Vec<Event>,
    versions: Vec<String>,
    affects_all_prior: bool,
}

impl EventSequenceBuilder {
    pub fn new(range_type: RangeType) -> Self {
        Self {
            range_type,
            inclusive_upper: InclusiveUpper::default(),
            events: Vec::new(),
            versions: Vec::new(),
            affects_all_prior: false,
        }
    }

    pub fn inclusive_upper(mut self, policy: InclusiveUpper) -> Self {
        self.inclusive_upper = policy;
        self
    }

    /// Adds the events for `spec`.
    ///
    /// `first_patched` is the source's separately reported fix version, if
    /// any.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::UnsupportedOperator`] for a strict `>` lower
    /// bound. Nothing is recorded for `spec` in that case.
    pub fn push(&mut self, spec: &RangeSpec, first_patched: Option<&str>) -> Result<()> {
        if let Some(exact) = spec.exact() {
            match first_patched {
                Some(fixed) => {
                    self.events.push(Event::Introduced(exact.version.clone()));
                    self.events.push(Event::Fixed(fixed.to_string()));
                }
                None => self.versions.push(exact.version.clone()),
            }
            return Ok(());
        }

        let mut pending = Vec::with_capacity(2);

        match spec.lower() {
            Some(lower) if lower.operator == Operator::Ge => {
                pending.push(Event::Introduced(lower.version.clone()));
            }
            Some(lower) => {
                return Err(ConvertError::UnsupportedOperator {
                    operator: lower.operator,
                    version: lower.version.clone(),
                });
            }
            None => self.affects_all_prior = true,
        }

        match spec.upper() {
            Some(upper) if upper.operator == Operator::Lt => {
                pending.push(Event::Fixed(upper.version.clone()));
            }
            Some(upper) => match self.inclusive_upper {
                InclusiveUpper::FirstPatched => {
                    if let Some(fixed) = first_patched {
                        pending.push(Event::Fixed(fixed.to_string()));
                    }
                }
                InclusiveUpper::LastAffected => {
                    pending.push(Event::LastAffected(upper.version.clone()));
                }
            },
            None => {
                if let Some(fixed) = first_patched {
                    pending.push(Event::Fixed(fixed.to_string()));
                }
            }
        }

        self.events.extend(pending);
        Ok(())
    }

    /// Closes the range, inserting `introduced: "0"` first when some pushed
    /// spec had no lower bound and the range does not already open at zero.
    pub fn finish(mut self) -> Normalized {
        let opens_at_zero = matches!(self.events.first(), Some(Event::Introduced(v)) if v == "0");
        if self.affects_all_prior && !opens_at_zero {
            self.events.insert(0, Event::Introduced("0".to_string()));
        }

        Normalized {
            range: Range::from_events(self.range_type, self.events),
            versions: self.versions,
        }
    }
}

/// Normalizes a single spec with the default inclusive-upper policy.
pub fn normalize(
    spec: &RangeSpec,
    first_patched: Option<&str>,
    range_type: RangeType,
) -> Result<Normalized> {
    let mut builder = EventSequenceBuilder::new(range_type);
    builder.push(spec, first_patched)?;
    Ok(builder.finish())
}
