//! Terminal output: colorized JSON, tables and summary lines

use owo_colors::{OwoColorize, Stream, Style};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::Value;
use std::io::{self, Write};
use tabled::settings::Style as TableStyle;
use tabled::{Table, Tabled};

use crate::depth::DepthSummary;
use crate::parser::{Balance, Order, SymbolInfo};
use crate::scenario::{ExpiryReport, Notification};

/// Whether rendered JSON carries ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    Plain,
    /// Colored when stdout supports it
    Terminal,
}

impl Palette {
    fn colored(self) -> bool {
        match self {
            Palette::Plain => false,
            // An empty string only grows if escape codes get added
            Palette::Terminal => !""
                .if_supports_color(Stream::Stdout, |t| t.blue())
                .to_string()
                .is_empty(),
        }
    }
}

/// Print a JSON value with sorted keys and syntax colors
pub fn print_colorful_json(value: &Value) {
    println!("{}", render_json(value, Palette::Terminal));
}

/// Pretty print a JSON value, four space indent
///
/// Keys come out sorted since `serde_json::Map` is ordered by key.
pub fn render_json(value: &Value, palette: Palette) -> String {
    let formatter = Painter {
        layout: PrettyFormatter::with_indent(b"    "),
        colored: palette.colored(),
        in_key: false,
    };
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Pretty layout with ANSI colors around keys and scalars
struct Painter<'a> {
    layout: PrettyFormatter<'a>,
    colored: bool,
    in_key: bool,
}

impl Painter<'_> {
    fn open<W: ?Sized + Write>(&self, writer: &mut W, style: &Style) -> io::Result<()> {
        if self.colored {
            write!(writer, "{}", style.prefix_formatter())?;
        }
        Ok(())
    }

    fn close<W: ?Sized + Write>(&self, writer: &mut W, style: &Style) -> io::Result<()> {
        if self.colored {
            write!(writer, "{}", style.suffix_formatter())?;
        }
        Ok(())
    }

    fn string_style(&self) -> Style {
        if self.in_key {
            Style::new().blue()
        } else {
            Style::new().green()
        }
    }

    fn scalar<W>(&self, writer: &mut W, style: &Style, text: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        self.open(writer, style)?;
        writer.write_all(text.as_bytes())?;
        self.close(writer, style)
    }
}

impl Formatter for Painter<'_> {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        self.layout.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        self.in_key = true;
        self.layout.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.in_key = false;
        self.layout.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.layout.end_object_value(writer)
    }

    fn begin_string<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.open(writer, &self.string_style())?;
        writer.write_all(b"\"")
    }

    fn end_string<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\"")?;
        self.close(writer, &self.string_style())
    }

    fn write_null<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.scalar(writer, &Style::new().yellow(), "null")
    }

    fn write_bool<W: ?Sized + Write>(&mut self, writer: &mut W, value: bool) -> io::Result<()> {
        self.scalar(writer, &Style::new().yellow(), if value { "true" } else { "false" })
    }

    fn write_i64<W: ?Sized + Write>(&mut self, writer: &mut W, value: i64) -> io::Result<()> {
        self.scalar(writer, &Style::new().cyan(), &value.to_string())
    }

    fn write_u64<W: ?Sized + Write>(&mut self, writer: &mut W, value: u64) -> io::Result<()> {
        self.scalar(writer, &Style::new().cyan(), &value.to_string())
    }

    fn write_f64<W: ?Sized + Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        self.scalar(writer, &Style::new().cyan(), &Value::from(value).to_string())
    }
}

/// Human readable summary of one side of the book
pub fn depth_lines(summary: &DepthSummary) -> Vec<String> {
    let side = summary.side;
    let base = &summary.assets.base;
    let quote = &summary.assets.quote;

    let Some((top_price, top_quantity)) = summary.top_of_book() else {
        return vec![format!("There are no {side} orders in the order book")];
    };

    vec![
        format!(
            "Top {side} is {} {quote} with the quantity of {} {base}",
            top_price.normalize(),
            top_quantity.normalize()
        ),
        format!(
            "Total {} {base} {side}s at the liquidity of {} {quote}, average price is {} {quote}",
            summary.cumulative_quantity.normalize(),
            summary.total_liquidity.round_dp(2).normalize(),
            summary.average_price.round_dp(8).normalize()
        ),
        format!(
            "A {} can take at most {} {base}",
            summary.market_order_name,
            summary.cumulative_quantity.normalize()
        ),
    ]
}

/// Lines describing a finished expiry scenario
pub fn expiry_lines(report: &ExpiryReport) -> Vec<String> {
    let mut lines = depth_lines(&report.initial);
    let seed = &report.seed_order;
    lines.push(format!(
        "Seed order {} {} {} at {} is {}",
        seed.client_order_id,
        seed.side,
        seed.orig_qty.normalize(),
        seed.price.normalize(),
        seed.status
    ));
    lines.extend(depth_lines(&report.seeded));

    let test = &report.test_order;
    lines.push(format!(
        "Test order {} {} {} at {} is {}, executed {} of {}",
        test.client_order_id,
        test.side,
        test.order_type,
        test.price.normalize(),
        test.status,
        test.executed_qty.normalize(),
        test.orig_qty.normalize()
    ));

    match &report.notification {
        Notification::Observed(reports) => {
            for r in reports {
                lines.push(format!(
                    "Received executionReport {} status {} filled {}",
                    r.execution_type,
                    r.order_status,
                    r.cumulative_filled_qty.normalize()
                ));
            }
        }
        Notification::NotObserved { waited } => lines.push(format!(
            "No user stream notification for the test order within {}s",
            waited.as_secs()
        )),
    }
    lines
}

#[derive(Tabled)]
struct BalanceRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Free")]
    free: String,
    #[tabled(rename = "Locked")]
    locked: String,
}

/// Non-zero balances as a table
pub fn balances_table(balances: &[Balance]) -> String {
    let rows: Vec<BalanceRow> = balances
        .iter()
        .filter(|b| !b.total().is_zero())
        .map(|b| BalanceRow {
            asset: b.asset.clone(),
            free: b.free.normalize().to_string(),
            locked: b.locked.normalize().to_string(),
        })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}

#[derive(Tabled)]
struct OrderRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Client id")]
    client_order_id: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Type")]
    order_type: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Executed")]
    executed: String,
    #[tabled(rename = "Status")]
    status: String,
}

pub fn orders_table(orders: &[Order]) -> String {
    let rows: Vec<OrderRow> = orders
        .iter()
        .map(|o| OrderRow {
            symbol: o.symbol.clone(),
            client_order_id: o.client_order_id.clone(),
            side: o.side.to_string(),
            order_type: o.order_type.to_string(),
            price: o.price.normalize().to_string(),
            quantity: o.orig_qty.normalize().to_string(),
            executed: o.executed_qty.normalize().to_string(),
            status: o.status.to_string(),
        })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}

#[derive(Tabled)]
struct MarketRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Base")]
    base: String,
    #[tabled(rename = "Quote")]
    quote: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Tick")]
    tick: String,
    #[tabled(rename = "Step")]
    step: String,
}

pub fn markets_table(symbols: &[SymbolInfo]) -> String {
    let show = |d: Option<Decimal>| {
        d.map(|d| d.normalize().to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    let rows: Vec<MarketRow> = symbols
        .iter()
        .map(|s| MarketRow {
            symbol: s.symbol.clone(),
            base: s.base_asset.clone(),
            quote: s.quote_asset.clone(),
            status: s.status.clone(),
            tick: show(s.tick_size()),
            step: show(s.step_size()),
        })
        .collect();
    Table::new(rows).with(TableStyle::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::{summarize, AssetPair, Side};
    use crate::parser::PriceLevel;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_render_json_sorts_keys_and_indents() {
        let value = json!({
            "s": "BTCUSDT",
            "e": "executionReport",
            "E": 1,
            "x": [true, null, 0.5],
            "o": {},
        });
        let rendered = render_json(&value, Palette::Plain);
        let expected = r#"{
    "E": 1,
    "e": "executionReport",
    "o": {},
    "s": "BTCUSDT",
    "x": [
        true,
        null,
        0.5
    ]
}"#;
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_render_json_escapes_strings() {
        let rendered = render_json(&json!("say \"hi\"\n"), Palette::Plain);
        assert_eq!(rendered, r#""say \"hi\"\n""#);
    }

    #[test]
    fn test_terminal_palette_only_adds_escape_codes() {
        let value = json!({ "side": "ask", "levels": [1, 2], "empty": false });
        let plain = render_json(&value, Palette::Plain);
        let painted = render_json(&value, Palette::Terminal);

        let mut stripped = String::new();
        let mut chars = painted.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                chars.by_ref().find(|&c| c == 'm');
            } else {
                stripped.push(c);
            }
        }
        assert_eq!(stripped, plain);
    }

    #[test]
    fn test_depth_lines() {
        let levels = [
            PriceLevel::new(dec!(100), dec!(1)),
            PriceLevel::new(dec!(101), dec!(2)),
            PriceLevel::new(dec!(99), dec!(0.5)),
        ];
        let summary = summarize(&levels, Side::Ask, &AssetPair::new("BTC", "USDT")).unwrap();
        let lines = depth_lines(&summary);

        assert_eq!(lines[0], "Top ask is 99 USDT with the quantity of 0.5 BTC");
        assert!(lines[1].starts_with("Total 3.5 BTC asks at the liquidity of 351.5 USDT"));
        assert_eq!(lines[2], "A market buy can take at most 3.5 BTC");
    }

    #[test]
    fn test_depth_lines_empty_side() {
        let summary = summarize(&[], Side::Bid, &AssetPair::new("ETH", "BTC")).unwrap();
        assert_eq!(depth_lines(&summary), vec!["There are no bid orders in the order book"]);
    }

    #[test]
    fn test_balances_table_skips_zero() {
        let balances = vec![
            Balance {
                asset: "BTC".to_string(),
                free: dec!(1.5),
                locked: dec!(0),
            },
            Balance {
                asset: "XRP".to_string(),
                free: dec!(0),
                locked: dec!(0),
            },
        ];
        let table = balances_table(&balances);
        assert!(table.contains("BTC"));
        assert!(table.contains("1.5"));
        assert!(!table.contains("XRP"));
    }
}
