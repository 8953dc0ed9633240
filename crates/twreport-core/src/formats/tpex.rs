//! TPEx (OTC) report layouts
//!
//! OTC headers drift between releases (code columns appear as `代號`,
//! `代碼`, `股票代號` or `證券代號`), so these rules lean on substring and
//! fallback selectors.

use super::{FormatSpec, MarkColumns, SourceId};
use crate::mapper::{ColumnRule, Selector};

use Selector::{Contains, ContainsAll, ContainsAny, Exact, FirstOf, Position, StartsWith};

const CODE: Selector = ContainsAny(&["代號", "代碼"]);

const CODE_OR_FIRST: Selector = FirstOf(&[
    Contains("證券代號"),
    Contains("代號"),
    Contains("股票代號"),
    Contains("代碼"),
    Position(0),
]);

pub(super) const DAILY_CLOSE: FormatSpec = FormatSpec {
    source: SourceId::DailyClose,
    description: "上櫃股票每日收盤行情 (daily closing quotes, no 14:30 session)",
    header_needles: &["代號", "收盤"],
    skip_hint: Some(3),
    rules: &[
        ColumnRule::key(CODE),
        ColumnRule::text("name", Contains("名稱")).required(),
        ColumnRule::numeric("close", StartsWith("收盤")).required(),
        ColumnRule::numeric("change", Contains("漲跌")),
        ColumnRule::numeric("open", Contains("開盤")),
        ColumnRule::numeric("high", Contains("最高")),
        ColumnRule::numeric("low", Contains("最低")),
        ColumnRule::numeric("avg_price", Contains("均價")),
        ColumnRule::numeric("volume", Contains("成交股數")),
        ColumnRule::numeric("amount", Contains("成交金額")),
        ColumnRule::numeric("trades", Contains("成交筆數")),
        ColumnRule::numeric("last_bid_price", Contains("最後買價")),
        ColumnRule::numeric("last_bid_vol", Contains("最後買量")),
        ColumnRule::numeric("last_ask_price", Contains("最後賣價")),
        ColumnRule::numeric("last_ask_vol", Contains("最後賣量")),
        ColumnRule::numeric("issued_shares", Contains("發行股數")),
        ColumnRule::numeric("next_ref_price", Contains("次日參考價")),
        ColumnRule::numeric("next_up_limit", Contains("次日漲停價")),
        ColumnRule::numeric("next_down_limit", Contains("次日跌停價")),
    ],
    mark_columns: None,
};

/// Only the net (買賣超) column of each investor group is kept
pub(super) const INSTITUTIONAL_DETAIL: FormatSpec = FormatSpec {
    source: SourceId::InstitutionalDetail,
    description: "三大法人買賣明細 (institutional trading detail)",
    header_needles: &["代號", "買賣超"],
    skip_hint: Some(1),
    rules: &[
        ColumnRule::key(CODE),
        ColumnRule::text("name", Contains("名稱")).required(),
        ColumnRule::numeric("ii_foreign_net", ContainsAll(&["外資及陸資", "買賣超"])),
        ColumnRule::numeric("ii_foreign_self_net", ContainsAll(&["外資自營商", "買賣超"])),
        ColumnRule::numeric("ii_trust_net", ContainsAll(&["投信", "買賣超"])),
        ColumnRule::numeric("ii_dealer_self_net", ContainsAll(&["自營商(自行買賣)", "買賣超"])),
        ColumnRule::numeric("ii_dealer_hedge_net", ContainsAll(&["自營商(避險)", "買賣超"])),
        ColumnRule::numeric("ii_total_net", ContainsAll(&["合計", "買賣超"])),
    ],
    mark_columns: None,
};

pub(super) const DAY_TRADING: FormatSpec = FormatSpec {
    source: SourceId::DayTrading,
    description: "現股當沖交易統計 (day-trading statistics)",
    header_needles: &["代號", "成交股數"],
    skip_hint: Some(5),
    rules: &[
        ColumnRule::key(CODE_OR_FIRST),
        ColumnRule::text("name", FirstOf(&[Contains("證券名稱"), Contains("名稱"), Contains("股票名稱")])),
        ColumnRule::text("flag", Contains("暫停")),
        ColumnRule::numeric("dt_volume", Contains("成交股數")),
        ColumnRule::numeric("dt_buy_amount", Contains("買進成交金額")),
        ColumnRule::numeric("dt_sell_amount", Contains("賣出成交金額")),
        ColumnRule::numeric("dt_total_amount", Contains("買賣總額")),
        ColumnRule::numeric("dt_rate", Contains("當沖率")),
    ],
    mark_columns: None,
};

/// Code and name headers match exactly
pub(super) const HIGHLIGHT: FormatSpec = FormatSpec {
    source: SourceId::Highlight,
    description: "融資融券餘額概況 (margin balance highlights)",
    header_needles: &["代號", "券資比"],
    skip_hint: Some(2),
    rules: &[
        ColumnRule::numeric("rank", Contains("排名")).required(),
        ColumnRule::key(Exact("代號")),
        ColumnRule::text("name", Exact("名稱")).required(),
        ColumnRule::numeric("hg_margin_balance", Contains("月均融資餘額")),
        ColumnRule::numeric("hg_short_balance", Contains("月均融券餘額")),
        ColumnRule::numeric("hg_ratio", Contains("券資比")),
    ],
    mark_columns: None,
};

pub(super) const SBL: FormatSpec = FormatSpec {
    source: SourceId::Sbl,
    description: "融券借券賣出餘額 (securities borrowing and lending)",
    header_needles: &["股票代號", "借券"],
    skip_hint: Some(2),
    rules: &[
        ColumnRule::key(Contains("股票代號")),
        ColumnRule::text("name", Contains("股票名稱")),
        ColumnRule::numeric("owz_short_prev_balance", Contains("融券前日餘額")),
        ColumnRule::numeric("owz_short_sell", Contains("融券賣出")),
        ColumnRule::numeric("owz_short_buy", Contains("融券買進")),
        ColumnRule::numeric("owz_short_spot", Contains("融券現券")),
        ColumnRule::numeric("owz_short_today_balance", Contains("融券當日餘額")),
        ColumnRule::numeric("owz_short_limit", Contains("融券限額")),
        ColumnRule::numeric("owz_borrow_prev_balance", Contains("借券前日餘額")),
        ColumnRule::numeric("owz_borrow_sell", Contains("借券當日賣出")),
        ColumnRule::numeric("owz_borrow_return", Contains("借券當日還券")),
        ColumnRule::numeric("owz_borrow_adj", Contains("借券當日調整數額")),
        ColumnRule::numeric("owz_borrow_today_balance", Contains("借券當日餘額")),
        ColumnRule::numeric("owz_borrow_next_limit", Contains("借券次一營業日可借券賣出限額")),
        ColumnRule::text("remark", Contains("備註")),
    ],
    mark_columns: None,
};

/// `前資餘額` is declared before `資餘額` so the longer header is claimed first
pub(super) const MARGIN_TRANSACTIONS: FormatSpec = FormatSpec {
    source: SourceId::MarginTransactions,
    description: "上櫃股票融資融券餘額 (margin transactions)",
    header_needles: &["資餘額", "券餘額"],
    skip_hint: Some(2),
    rules: &[
        ColumnRule::key(CODE_OR_FIRST),
        ColumnRule::text("name", FirstOf(&[Contains("名稱"), Position(1)])),
        ColumnRule::numeric("mt_prev_balance", Contains("前資餘額")),
        ColumnRule::numeric("mt_buy", Contains("資買")),
        ColumnRule::numeric("mt_sell", Contains("資賣")),
        ColumnRule::numeric("mt_pay", Contains("現償")),
        ColumnRule::numeric("mt_balance", Contains("資餘額")),
        ColumnRule::numeric("mt_cash", Contains("資屬證金")),
        ColumnRule::numeric("mt_usage_rate", Contains("資使用率")),
        ColumnRule::numeric("mt_limit", Contains("資限額")),
        ColumnRule::numeric("st_prev_balance", Contains("前券餘額")),
        ColumnRule::numeric("st_sell", Contains("券賣")),
        ColumnRule::numeric("st_buy", Contains("券買")),
        ColumnRule::numeric("st_pay", Contains("券償")),
        ColumnRule::numeric("st_balance", Contains("券餘額")),
        ColumnRule::numeric("st_cash", Contains("券屬證金")),
        ColumnRule::numeric("st_usage_rate", Contains("券使用率")),
        ColumnRule::numeric("st_limit", Contains("券限額")),
        ColumnRule::numeric("mt_st_offset", Contains("資券相抵")),
        ColumnRule::text("remark", Contains("備註")),
    ],
    mark_columns: None,
};

fn is_mark_header(header: &str) -> bool {
    ["暫停", "標記", "註記"].iter().any(|t| header.contains(t)) || header.chars().count() <= 3
}

pub(super) const EXEMPTED: FormatSpec = FormatSpec {
    source: SourceId::Exempted,
    description: "平盤下得融(借)券賣出註記 (short-sale exemption marks)",
    header_needles: &["名稱"],
    skip_hint: Some(1),
    rules: &[
        ColumnRule::key(FirstOf(&[Contains("證券代號"), Contains("代號"), Contains("代碼"), Position(0)])),
        ColumnRule::text("name", FirstOf(&[Contains("證券名稱"), Contains("名稱")])),
    ],
    mark_columns: Some(MarkColumns {
        field: "mark",
        matches: is_mark_header,
    }),
};

const INVESTMENT_TRUST_RULES: &[ColumnRule] = &[
    ColumnRule::text("rank", Contains("排行")).required(),
    ColumnRule::key(Contains("代號")),
    ColumnRule::text("name", Contains("名稱")).required(),
    ColumnRule::numeric("it_buy_shares", Contains("買進")),
    ColumnRule::numeric("it_sell_shares", Contains("賣出")),
    ColumnRule::numeric("it_diff_shares", Contains("買賣超")),
    ColumnRule::numeric("it_buy_amount", Contains("買進金額")),
    ColumnRule::numeric("it_sell_amount", Contains("賣出金額")),
    ColumnRule::numeric("it_diff_amount", Contains("買賣超金額")),
];

pub(super) const INVESTMENT_TRUST_BUY: FormatSpec = FormatSpec {
    source: SourceId::InvestmentTrustBuy,
    description: "投信買超排行 (investment trust top net buys)",
    header_needles: &["排行", "代號"],
    skip_hint: Some(1),
    rules: INVESTMENT_TRUST_RULES,
    mark_columns: None,
};

pub(super) const INVESTMENT_TRUST_SELL: FormatSpec = FormatSpec {
    source: SourceId::InvestmentTrustSell,
    description: "投信賣超排行 (investment trust top net sells)",
    header_needles: &["排行", "代號"],
    skip_hint: Some(1),
    rules: INVESTMENT_TRUST_RULES,
    mark_columns: None,
};
