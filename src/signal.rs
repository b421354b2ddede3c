// signal.rs — Encodes an answer letter as a count of indicator flashes.
//
// A=1 flash, B=2, ... by default. Each flash is on/hold/off/hold; flashes are
// separated by a longer pause. Nothing is acknowledged: the user counts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::Symbol;
use crate::indicator::Indicator;
use crate::shutdown::ShutdownSignal;

/// Symbol → number of flashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalTable {
    counts: BTreeMap<Symbol, u32>,
}

impl Default for SignalTable {
    fn default() -> Self {
        let counts = ('A'..='F')
            .zip(1..)
            .filter_map(|(c, n)| Symbol::new(c).map(|s| (s, n)))
            .collect();
        Self { counts }
    }
}

impl SignalTable {
    pub fn new(counts: BTreeMap<Symbol, u32>) -> Self {
        Self { counts }
    }

    pub fn count(&self, symbol: Symbol) -> Option<u32> {
        self.counts.get(&symbol).copied()
    }

    /// The valid answer letters, in order.
    pub fn alphabet(&self) -> Vec<Symbol> {
        self.counts.keys().copied().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalTiming {
    pub on: Duration,
    pub off: Duration,
    /// Extra pause between flashes, never after the last one.
    pub pause: Duration,
}

impl Default for SignalTiming {
    fn default() -> Self {
        Self {
            on: Duration::from_millis(150),
            off: Duration::from_millis(150),
            pause: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStep {
    Toggle,
    HoldOn(Duration),
    HoldOff(Duration),
    Pause(Duration),
}

/// Largest flash count a table may use; longer sequences can't be counted
/// reliably by eye.
pub const MAX_FLASHES: u32 = 26;

/// The step sequence for `count` flashes, produced lazily.
pub fn flash_plan(count: u32, timing: &SignalTiming) -> impl Iterator<Item = SignalStep> {
    let t = *timing;
    (0..count).flat_map(move |i| {
        let pause = (i + 1 < count).then_some(SignalStep::Pause(t.pause));
        [
            SignalStep::Toggle,
            SignalStep::HoldOn(t.on),
            SignalStep::Toggle,
            SignalStep::HoldOff(t.off),
        ]
        .into_iter()
        .chain(pause)
    })
}

/// How a `signal` call went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalReport {
    pub symbol: Symbol,
    pub planned_cycles: u32,
    pub completed_cycles: u32,
    pub interrupted: bool,
    pub indicator_failed: bool,
}

pub struct SignalEncoder {
    table: SignalTable,
    timing: SignalTiming,
    indicator: Arc<dyn Indicator>,
    shutdown: ShutdownSignal,
}

impl SignalEncoder {
    pub fn new(
        table: SignalTable,
        timing: SignalTiming,
        indicator: Arc<dyn Indicator>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            table,
            timing,
            indicator,
            shutdown,
        }
    }

    pub fn table(&self) -> &SignalTable {
        &self.table
    }

    /// Flash `symbol`. The shutdown flag is checked before every step; once it
    /// is set the remaining steps are dropped. If that leaves the indicator
    /// lit it is toggled back so the LED ends where it started.
    pub async fn signal(&self, symbol: Symbol) -> SignalReport {
        let mut report = SignalReport {
            symbol,
            planned_cycles: 0,
            completed_cycles: 0,
            interrupted: false,
            indicator_failed: false,
        };

        let Some(count) = self.table.count(symbol) else {
            log::warn!("Cannot signal '{}': not in the signal table", symbol);
            return report;
        };
        report.planned_cycles = count;

        log::info!(
            "Signaling answer {} ({} flashes on {})",
            symbol,
            count,
            self.indicator.name()
        );

        let mut lit = false;
        for step in flash_plan(count, &self.timing) {
            if self.shutdown.is_set() {
                report.interrupted = true;
                break;
            }
            match step {
                SignalStep::Toggle => {
                    if let Err(e) = self.indicator.toggle() {
                        log::error!("Indicator toggle failed: {}", e);
                        report.indicator_failed = true;
                        break;
                    }
                    lit = !lit;
                    if !lit {
                        report.completed_cycles += 1;
                    }
                }
                SignalStep::HoldOn(d) | SignalStep::HoldOff(d) | SignalStep::Pause(d) => {
                    tokio::time::sleep(d).await;
                }
            }
        }

        if lit {
            match self.indicator.toggle() {
                Ok(()) => log::debug!("Indicator restored after abandoned flash"),
                Err(e) => log::error!("Could not restore indicator: {}", e),
            }
        }

        if report.interrupted {
            log::info!(
                "Signaling interrupted after {}/{} flashes",
                report.completed_cycles,
                count
            );
        } else if !report.indicator_failed {
            log::info!("Finished signaling '{}'", symbol);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing() -> SignalTiming {
        SignalTiming {
            on: Duration::from_millis(150),
            off: Duration::from_millis(150),
            pause: Duration::from_millis(500),
        }
    }

    #[test]
    fn default_table_maps_a_to_f() {
        let table = SignalTable::default();
        let alphabet: String = table.alphabet().iter().map(|s| s.as_char()).collect();
        assert_eq!(alphabet, "ABCDEF");
        assert_eq!(table.count(Symbol::new('A').unwrap()), Some(1));
        assert_eq!(table.count(Symbol::new('F').unwrap()), Some(6));
        assert_eq!(table.count(Symbol::new('G').unwrap()), None);
    }

    #[test]
    fn plan_has_count_cycles_and_count_minus_one_pauses() {
        for count in 1..=6u32 {
            let plan: Vec<_> = flash_plan(count, &timing()).collect();
            let toggles = plan.iter().filter(|s| **s == SignalStep::Toggle).count();
            let pauses = plan
                .iter()
                .filter(|s| matches!(s, SignalStep::Pause(_)))
                .count();
            assert_eq!(toggles, 2 * count as usize, "count={}", count);
            assert_eq!(pauses, count as usize - 1, "count={}", count);
            assert!(
                !matches!(plan.last(), Some(SignalStep::Pause(_))),
                "no pause after the last flash (count={})",
                count
            );
        }
    }

    #[test]
    fn plan_cycle_shape() {
        let t = timing();
        assert_eq!(
            flash_plan(2, &t).collect::<Vec<_>>(),
            vec![
                SignalStep::Toggle,
                SignalStep::HoldOn(t.on),
                SignalStep::Toggle,
                SignalStep::HoldOff(t.off),
                SignalStep::Pause(t.pause),
                SignalStep::Toggle,
                SignalStep::HoldOn(t.on),
                SignalStep::Toggle,
                SignalStep::HoldOff(t.off),
            ]
        );
    }

    #[test]
    fn zero_count_plans_nothing() {
        assert_eq!(flash_plan(0, &timing()).count(), 0);
    }

    #[test]
    fn plan_is_built_lazily() {
        let mut plan = flash_plan(u32::MAX, &timing());
        assert_eq!(plan.next(), Some(SignalStep::Toggle));
        assert_eq!(plan.by_ref().take(4).count(), 4);
        assert!(matches!(plan.next(), Some(SignalStep::Toggle)));
    }
}
