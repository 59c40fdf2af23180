use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::tables::*;
use crate::allocator::{Advance, CounterStore, NumberScope};

impl Database {
    // ========================================================================
    // Project number counters
    // ========================================================================

    /// Last counter value issued in a scope
    pub fn counter_value(&self, scope: &NumberScope) -> Result<Option<u64>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NUMBER_COUNTERS)?;
        let value = table.get(scope.key().as_str())?.map(|v| v.value());
        Ok(value)
    }

    /// Compare-and-set the scope counter and claim the resulting number.
    /// Numbers claimed by other scopes are skipped.
    pub fn advance_counter(
        &self,
        scope: &NumberScope,
        expected: Option<u64>,
    ) -> Result<Advance, DatabaseError> {
        let key = scope.key();
        let write_txn = self.begin_write()?;

        let advance = {
            let mut counters = write_txn.open_table(NUMBER_COUNTERS)?;
            let actual = counters.get(key.as_str())?.map(|v| v.value());
            if actual != expected {
                // Dropping the transaction aborts it.
                return Ok(Advance::Lost);
            }

            let mut claims = write_txn.open_table(NUMBER_CLAIMS)?;
            let mut candidate = expected.unwrap_or(0) + 1;
            loop {
                let Some(number) = scope.render(candidate) else {
                    return Ok(Advance::Exhausted);
                };
                if claims.get(number.as_str())?.is_none() {
                    claims.insert(number.as_str(), key.as_str())?;
                    counters.insert(key.as_str(), candidate)?;
                    break Advance::Claimed {
                        counter: candidate,
                        number,
                    };
                }
                candidate += 1;
            }
        };

        write_txn.commit()?;
        Ok(advance)
    }

    /// Whether a project number has ever been issued
    pub fn number_claimed(&self, number: &str) -> Result<bool, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(NUMBER_CLAIMS)?;
        Ok(table.get(number)?.is_some())
    }
}

impl CounterStore for Database {
    fn current(&self, scope: &NumberScope) -> Result<Option<u64>, DatabaseError> {
        self.counter_value(scope)
    }

    fn compare_and_advance(
        &self,
        scope: &NumberScope,
        expected: Option<u64>,
    ) -> Result<Advance, DatabaseError> {
        self.advance_counter(scope, expected)
    }
}
