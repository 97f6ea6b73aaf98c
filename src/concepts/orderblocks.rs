//! Order block detection.
//!
//! An order block is the last opposing candle before a structure break.
//! Bullish OB: last bearish-bodied candle before a bullish break; bearish
//! mirrors. Statuses are resolved by replaying the bars after the trigger.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    concepts::structure::StructureEvent,
    data::{
        candle::Candle,
        domain::{Direction, Price},
    },
};

const OB_SEARCH_WINDOW: usize = 50;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ObStatus {
    Active,
    Tested,
    Mitigated,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub direction: Direction,
    pub top: Price,
    pub bottom: Price,
    /// Index of the order-block candle itself.
    pub ob_index: usize,
    /// Index of the structure break that created it.
    pub trigger_index: usize,
    pub status: ObStatus,
    /// Bar where the block broke (close through its far side), if it did.
    pub broken_index: Option<usize>,
}

/// Detect order blocks for each structure event and resolve their final
/// status over the remainder of the series (close-based mitigation).
pub fn detect_orderblocks(candles: &[Candle], structure: &[StructureEvent]) -> Vec<OrderBlock> {
    let mut blocks = Vec::new();

    for event in structure {
        let search_start = event.swing_index.min(candles.len().saturating_sub(1));
        let search_floor = search_start.saturating_sub(OB_SEARCH_WINDOW);
        let wanted_body = event.direction.flipped();

        let found = (search_floor..=search_start)
            .rev()
            .find(|&j| candles[j].body_direction() == Some(wanted_body));

        if let Some(j) = found {
            let mut block = OrderBlock {
                direction: event.direction,
                top: candles[j].high,
                bottom: candles[j].low,
                ob_index: j,
                trigger_index: event.broken_index,
                status: ObStatus::Active,
                broken_index: None,
            };
            resolve_status(candles, &mut block);
            blocks.push(block);
        }
    }

    blocks
}

/// Walk the bars after the trigger and settle the block's status:
/// a close through the far side breaks it, a wick into the zone tests it.
fn resolve_status(candles: &[Candle], block: &mut OrderBlock) {
    for (pos, bar) in candles.iter().enumerate().skip(block.trigger_index + 1) {
        match block.direction {
            Direction::Bullish => {
                if bar.close.0 < block.bottom.0 {
                    block.status = ObStatus::Broken;
                    block.broken_index = Some(pos);
                    return;
                }
                if bar.low.0 <= block.top.0 && block.status == ObStatus::Active {
                    block.status = ObStatus::Tested;
                }
            }
            Direction::Bearish => {
                if bar.close.0 > block.top.0 {
                    block.status = ObStatus::Broken;
                    block.broken_index = Some(pos);
                    return;
                }
                if bar.high.0 >= block.bottom.0 && block.status == ObStatus::Active {
                    block.status = ObStatus::Tested;
                }
            }
        }
    }
}
