//! Fills omitted tool arguments from the dashboard filters.

use models::{Filters, Period};
use serde_json::{Map, Value};

use crate::tools::ToolName;

/// Returns `args` with dashboard defaults added for every key the model left out.
///
/// Keys the model supplied (other than `null`) are never touched. The comparison tool
/// only receives the user, since its two months are explicit.
pub fn inject_defaults(tool: ToolName, args: &Map<String, Value>, filters: &Filters) -> Map<String, Value> {
    let mut out = args.clone();

    if tool != ToolName::SpendingComparison {
        insert_missing(&mut out, "period", || Some(Value::from(filters.period.as_str())));

        let effective = out
            .get("period")
            .and_then(Value::as_str)
            .and_then(Period::parse);

        match (effective, filters.period) {
            (Some(Period::Monthly), Period::Monthly) => {
                insert_missing(&mut out, "month", || filters.month.clone().map(Value::from));
            }
            (Some(Period::Yearly), Period::Yearly) => {
                insert_missing(&mut out, "year", || filters.year.map(Value::from));
            }
            _ => {}
        }
    }

    insert_missing(&mut out, "user", || filters.user_filter().map(Value::from));
    out
}

fn insert_missing(args: &mut Map<String, Value>, key: &str, default: impl FnOnce() -> Option<Value>) {
    let absent = args.get(key).is_none_or(Value::is_null);
    if absent {
        if let Some(value) = default() {
            args.insert(key.to_string(), value);
        }
    }
}
