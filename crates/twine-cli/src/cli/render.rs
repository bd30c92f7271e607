use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use twine_core::models::{GapMarker, RuleId, FilterRule, StatusItem};
use twine_core::pagination::{CompletionReport, TriggerOutcome};
use twine_core::store::{AccountSet, TimelineEntry, TruncateReport};

/// One row of `show` output.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryView {
    Status {
        account_id: u64,
        status_id: u64,
        time: String,
        user: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retweet_of: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    Gap {
        gap_id: u64,
        account_id: u64,
        upper: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        lower: Option<u64>,
    },
}

impl EntryView {
    pub fn from_entry(entry: TimelineEntry<'_>, accounts: &AccountSet) -> Self {
        match entry {
            TimelineEntry::Status(item) => Self::status(item, accounts),
            TimelineEntry::Gap(gap) => Self::gap(gap),
        }
    }

    fn status(item: &StatusItem, accounts: &AccountSet) -> Self {
        let color = accounts
            .show_account_color()
            .then(|| accounts.get(item.account_id).map(|a| a.color_hex()))
            .flatten();
        EntryView::Status {
            account_id: item.account_id.0,
            status_id: item.status_id.0,
            time: format_timestamp(item.timestamp),
            user: item.user_screen_name.clone(),
            text: item.text_plain.clone(),
            retweet_of: item.retweet.as_ref().map(|r| r.user_screen_name.clone()),
            color,
        }
    }

    fn gap(gap: &GapMarker) -> Self {
        EntryView::Gap {
            gap_id: gap.id.0,
            account_id: gap.account_id.0,
            upper: gap.upper.0,
            lower: gap.lower.map(|l| l.0),
        }
    }
}

/// RFC 3339 in UTC, or the raw value when it is out of range.
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| millis.to_string())
}

pub fn outcome(outcome: &TriggerOutcome) -> Value {
    match outcome {
        TriggerOutcome::Issued(request) => json!({
            "outcome": "issued",
            "task": request.task_id.0,
            "accounts": request.account_ids().iter().map(|a| a.0).collect::<Vec<_>>(),
        }),
        TriggerOutcome::Busy(task_id) => json!({ "outcome": "busy", "task": task_id.0 }),
        TriggerOutcome::Suppressed => json!({ "outcome": "suppressed" }),
        TriggerOutcome::NoAccounts => json!({ "outcome": "no_accounts" }),
    }
}

pub fn report(report: &CompletionReport) -> Value {
    let failures: Vec<Value> = report
        .failures
        .iter()
        .map(|(account_id, failure)| {
            json!({ "account_id": account_id.0, "error": failure.to_string() })
        })
        .collect();
    json!({
        "task": report.task_id.0,
        "direction": report.direction.to_string(),
        "accepted": report.accepted,
        "new_count": report.new_count,
        "succeeded": report.succeeded.iter().map(|a| a.0).collect::<Vec<_>>(),
        "failures": failures,
        "state": format!("{:?}", report.state).to_lowercase(),
    })
}

pub fn truncation(report: &TruncateReport) -> Value {
    json!({
        "evicted": report.evicted.len(),
        "trailing_gaps": report.trailing_gaps.iter().map(|g| g.0).collect::<Vec<_>>(),
    })
}

pub fn rules(rules: &[(RuleId, FilterRule)]) -> Value {
    let rows: Vec<Value> = rules
        .iter()
        .map(|(id, rule)| json!({ "id": id.0, "kind": rule.kind.as_str(), "value": rule.value }))
        .collect();
    json!(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use twine_core::models::{Account, AccountId, GapId, StatusId};

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_gap_view_serializes_tagged() {
        let gap = GapMarker {
            id: GapId(2),
            account_id: AccountId(1),
            upper: StatusId(100),
            lower: None,
        };
        let value = serde_json::to_value(EntryView::from_entry(
            TimelineEntry::Gap(&gap),
            &AccountSet::new(),
        ))
        .unwrap();
        assert_eq!(
            value,
            json!({ "type": "gap", "gap_id": 2, "account_id": 1, "upper": 100 })
        );
    }

    #[test]
    fn test_color_only_with_several_accounts() {
        let item = StatusItem {
            account_id: AccountId(1),
            status_id: StatusId(5),
            timestamp: 0,
            user_screen_name: "carol".to_string(),
            user_name: String::new(),
            text_plain: "hello".to_string(),
            links: vec![],
            source: None,
            in_reply_to_id: None,
            retweet: None,
            is_favorite: false,
        };
        let one = AccountSet::from_accounts([Account::new(AccountId(1), "a").with_color(0xff0000)]);
        let EntryView::Status { color, .. } = EntryView::from_entry(TimelineEntry::Status(&item), &one) else {
            panic!("expected a status row");
        };
        assert_eq!(color, None);

        let two = AccountSet::from_accounts([
            Account::new(AccountId(1), "a").with_color(0xff0000),
            Account::new(AccountId(2), "b"),
        ]);
        let EntryView::Status { color, .. } = EntryView::from_entry(TimelineEntry::Status(&item), &two) else {
            panic!("expected a status row");
        };
        assert_eq!(color.as_deref(), Some("#ff0000"));
    }
}
