use serde::{Deserialize, Serialize};

use common::{Instrument, InstrumentSignal, ResultBatch, StrategyKind, Timeframe};

/// Messages pushed to subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage<'a> {
    /// Sent once, right after a subscriber registers.
    Markets { data: &'a [Instrument] },
    /// One per emitted batch, tagged with the config it was computed under.
    Signals {
        data: &'a [InstrumentSignal],
        strategy: StrategyKind,
        timeframe: &'a Timeframe,
    },
}

impl<'a> From<&'a ResultBatch> for ServerMessage<'a> {
    fn from(batch: &'a ResultBatch) -> Self {
        ServerMessage::Signals {
            data: &batch.results,
            strategy: batch.config.strategy,
            timeframe: &batch.config.timeframe,
        }
    }
}

/// Messages received from subscribers.
///
/// Unknown `type` values deserialize to `Unknown` so newer clients can send
/// messages this server does not understand yet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    ChangeStrategy { strategy: String },
    ChangeTimeframe { timeframe: Timeframe },
    #[serde(other)]
    Unknown,
}
