//! Project number allocation.
//!
//! Numbers look like `P007-1/24`: a three-digit counter, the semester and the
//! last two digits of the academic year. Counters are kept per
//! (academic year, semester, course) scope and advanced with an optimistic
//! compare-and-set, so concurrent allocations in one scope never share a value.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::storage::DatabaseError;

/// Compare-and-set attempts before giving up with `AllocationConflict`.
const MAX_CAS_ATTEMPTS: u32 = 2;

/// Largest counter that fits the three-digit field.
pub const MAX_COUNTER: u64 = 999;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Allocation conflict for scope {scope}")]
    Conflict { scope: String },
    #[error("Project number invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// The counter scope a project number is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NumberScope {
    pub academic_year: i32,
    pub semester: u8,
    pub course_id: u64,
}

impl NumberScope {
    pub fn new(academic_year: i32, semester: u8, course_id: u64) -> Self {
        Self {
            academic_year,
            semester,
            course_id,
        }
    }

    /// Storage key of the scope's counter row.
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.academic_year, self.semester, self.course_id)
    }

    /// Render the project number for `counter` in this scope.
    /// Returns `None` when the result would not fit the number format.
    pub fn render(&self, counter: u64) -> Option<String> {
        if counter == 0 || counter > MAX_COUNTER || !(1..=9).contains(&self.semester) {
            return None;
        }
        Some(format!(
            "P{counter:03}-{}/{:02}",
            self.semester,
            self.academic_year.rem_euclid(100)
        ))
    }
}

impl fmt::Display for NumberScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year {} semester {} course {}",
            self.academic_year, self.semester, self.course_id
        )
    }
}

/// Outcome of one compare-and-set attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The counter moved to `counter` and `number` is now claimed.
    Claimed { counter: u64, number: String },
    /// Someone else advanced the counter since it was read.
    Lost,
    /// No renderable number is left in this scope.
    Exhausted,
}

/// Persistent per-scope counters.
pub trait CounterStore: Send + Sync {
    /// The last counter issued in the scope, if any.
    fn current(&self, scope: &NumberScope) -> Result<Option<u64>, DatabaseError>;

    /// Atomically: if the counter still equals `expected`, move it to the next
    /// value whose rendered number has never been claimed, and claim it.
    fn compare_and_advance(
        &self,
        scope: &NumberScope,
        expected: Option<u64>,
    ) -> Result<Advance, DatabaseError>;
}

/// A freshly issued project number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatedNumber {
    pub number: String,
    pub counter: u64,
}

/// True when `s` has the shape `P` + 3 digits + `-` + 1 digit + `/` + 2 digits.
pub fn is_well_formed(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 9
        && b[0] == b'P'
        && b[1..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5].is_ascii_digit()
        && b[6] == b'/'
        && b[7..9].iter().all(u8::is_ascii_digit)
}

#[derive(Clone)]
pub struct ProjectNumberAllocator {
    counters: Arc<dyn CounterStore>,
}

impl ProjectNumberAllocator {
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    /// Issue the next project number for the scope.
    pub fn allocate(&self, scope: NumberScope) -> Result<AllocatedNumber, AllocationError> {
        if !(1..=9).contains(&scope.semester) {
            return Err(AllocationError::Invariant(format!(
                "semester {} cannot be rendered",
                scope.semester
            )));
        }

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.counters.current(&scope)?;
            match self.counters.compare_and_advance(&scope, current)? {
                Advance::Claimed { counter, number } => {
                    if !is_well_formed(&number) {
                        return Err(AllocationError::Invariant(format!(
                            "allocated malformed project number {number:?}"
                        )));
                    }
                    tracing::debug!(scope = %scope, counter, number = %number, "Allocated project number");
                    return Ok(AllocatedNumber { number, counter });
                }
                Advance::Lost => {
                    tracing::debug!(scope = %scope, attempt, "Lost project number race");
                }
                Advance::Exhausted => {
                    return Err(AllocationError::Invariant(format!(
                        "no project numbers left for {scope}"
                    )));
                }
            }
        }

        Err(AllocationError::Conflict { scope: scope.key() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysLoses {
        attempts: AtomicUsize,
    }

    impl CounterStore for AlwaysLoses {
        fn current(&self, _scope: &NumberScope) -> Result<Option<u64>, DatabaseError> {
            Ok(Some(3))
        }

        fn compare_and_advance(
            &self,
            _scope: &NumberScope,
            _expected: Option<u64>,
        ) -> Result<Advance, DatabaseError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Advance::Lost)
        }
    }

    struct Fixed(Advance);

    impl CounterStore for Fixed {
        fn current(&self, _scope: &NumberScope) -> Result<Option<u64>, DatabaseError> {
            Ok(None)
        }

        fn compare_and_advance(
            &self,
            _scope: &NumberScope,
            _expected: Option<u64>,
        ) -> Result<Advance, DatabaseError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_render() {
        let scope = NumberScope::new(2024, 1, 42);
        assert_eq!(scope.render(1).as_deref(), Some("P001-1/24"));
        assert_eq!(scope.render(999).as_deref(), Some("P999-1/24"));
        assert_eq!(scope.render(1000), None);
        assert_eq!(scope.render(0), None);
        assert_eq!(NumberScope::new(2505, 2, 1).render(12).as_deref(), Some("P012-2/05"));
        assert_eq!(NumberScope::new(2024, 10, 1).render(1), None);
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("P001-1/24"));
        assert!(!is_well_formed("P1000-1/24"));
        assert!(!is_well_formed("P001-10/24"));
        assert!(!is_well_formed("X001-1/24"));
        assert!(!is_well_formed("P001-1/2024"));
    }

    #[test]
    fn test_conflict_after_two_lost_races() {
        let store = Arc::new(AlwaysLoses {
            attempts: AtomicUsize::new(0),
        });
        let allocator = ProjectNumberAllocator::new(store.clone());

        let result = allocator.allocate(NumberScope::new(2024, 1, 7));
        assert!(matches!(
            result,
            Err(AllocationError::Conflict { ref scope }) if scope == "2024/1/7"
        ));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_malformed_number_is_invariant_violation() {
        let allocator = ProjectNumberAllocator::new(Arc::new(Fixed(Advance::Claimed {
            counter: 1,
            number: "P1-1/24".to_string(),
        })));
        assert!(matches!(
            allocator.allocate(NumberScope::new(2024, 1, 1)),
            Err(AllocationError::Invariant(_))
        ));
    }

    #[test]
    fn test_exhausted_scope_is_invariant_violation() {
        let allocator = ProjectNumberAllocator::new(Arc::new(Fixed(Advance::Exhausted)));
        assert!(matches!(
            allocator.allocate(NumberScope::new(2024, 1, 1)),
            Err(AllocationError::Invariant(_))
        ));
    }

    #[test]
    fn test_unrenderable_semester_rejected_before_store() {
        let store = Arc::new(AlwaysLoses {
            attempts: AtomicUsize::new(0),
        });
        let allocator = ProjectNumberAllocator::new(store.clone());
        assert!(matches!(
            allocator.allocate(NumberScope::new(2024, 12, 1)),
            Err(AllocationError::Invariant(_))
        ));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    }
}
