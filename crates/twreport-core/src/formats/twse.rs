//! TWSE report layouts
//!
//! The institutional-trading reports (`twt44u`, `twt38u`) and the margin
//! report repeat their sub-headers under each group, so their rules select
//! by raw column position rather than by header text.

use super::{FormatSpec, SourceId};
use crate::mapper::{ColumnRule, Selector};

use Selector::{Contains, Position};

pub(super) const T86: FormatSpec = FormatSpec {
    source: SourceId::T86,
    description: "三大法人買賣超日報 (institutional net buy/sell)",
    header_needles: &["證券代號", "買賣超股數"],
    skip_hint: Some(1),
    rules: &[
        ColumnRule::key(Contains("證券代號")),
        ColumnRule::numeric("foreign_buy", Contains("外陸資買賣超股數(不含外資自營商)")).required(),
        ColumnRule::numeric("insti_net", Contains("三大法人買賣超股數")).required(),
    ],
    mark_columns: None,
};

pub(super) const TWT44U: FormatSpec = FormatSpec {
    source: SourceId::Twt44u,
    description: "投信買賣超彙總表 (investment trust buy/sell)",
    header_needles: &["證券代號"],
    skip_hint: Some(1),
    rules: &[
        ColumnRule::key(Position(1)),
        ColumnRule::numeric("trust_buy", Position(3)).required(),
        ColumnRule::numeric("trust_sell", Position(4)).required(),
        ColumnRule::numeric("trust_net", Position(5)).required(),
    ],
    mark_columns: None,
};

pub(super) const TWT38U: FormatSpec = FormatSpec {
    source: SourceId::Twt38u,
    description: "外資及陸資買賣超彙總表 (foreign investor buy/sell)",
    header_needles: &["證券代號", "買進股數"],
    skip_hint: Some(2),
    rules: &[
        ColumnRule::key(Position(1)),
        ColumnRule::numeric("FI_Buy", Position(3)).required(),
        ColumnRule::numeric("FI_Sell", Position(4)).required(),
        ColumnRule::numeric("FI_Net", Position(5)).required(),
        ColumnRule::zero_fill("PD_Buy"),
        ColumnRule::zero_fill("PD_Sell"),
        ColumnRule::zero_fill("PD_Net"),
        ColumnRule::numeric("FA_Buy", Position(9)).required(),
        ColumnRule::numeric("FA_Sell", Position(10)).required(),
        ColumnRule::numeric("FA_Net", Position(11)).required(),
    ],
    mark_columns: None,
};

/// Margin and short groups: today balance minus previous balance
pub(super) const MI_MARGN: FormatSpec = FormatSpec {
    source: SourceId::MiMargn,
    description: "融資融券餘額 (margin and short balances)",
    header_needles: &["代號", "今日餘額"],
    skip_hint: Some(7),
    rules: &[
        ColumnRule::key(Position(0)),
        ColumnRule::difference("margin_diff", Position(6), Position(5)).required(),
        ColumnRule::difference("short_diff", Position(12), Position(11)).required(),
    ],
    mark_columns: None,
};

pub(super) const MI_INDEX: FormatSpec = FormatSpec {
    source: SourceId::MiIndex,
    description: "每日收盤行情 (daily closing quotes)",
    header_needles: &["證券代號", "收盤價"],
    skip_hint: None,
    rules: &[
        ColumnRule::key(Contains("證券代號")),
        ColumnRule::text("name", Contains("證券名稱")),
        ColumnRule::numeric("volume", Contains("成交股數")),
        ColumnRule::numeric("value", Contains("成交金額")),
        ColumnRule::numeric("transactions", Contains("成交筆數")),
        ColumnRule::numeric("open", Contains("開盤價")),
        ColumnRule::numeric("high", Contains("最高價")),
        ColumnRule::numeric("low", Contains("最低價")),
        ColumnRule::numeric("close", Contains("收盤價")).required(),
        ColumnRule::numeric("change", Contains("漲跌價差")),
        ColumnRule::numeric("last_bid_price", Contains("最後揭示買價")),
        ColumnRule::numeric("last_bid_volume", Contains("最後揭示買量")),
        ColumnRule::numeric("last_ask_price", Contains("最後揭示賣價")),
        ColumnRule::numeric("last_ask_volume", Contains("最後揭示賣量")),
        ColumnRule::numeric("per", Contains("本益比")),
    ],
    mark_columns: None,
};
