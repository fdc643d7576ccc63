use super::SelectMatcher;
use crate::chat::Turn;
use crate::error::{Error, Result};
use crate::platform::Button;

impl SelectMatcher {
    fn index(&self) -> Option<usize> {
        match self {
            SelectMatcher::Index(index) => Some(*index),
            SelectMatcher::Text(text) => text.trim().parse().ok(),
        }
    }
}

type ButtonField = fn(&Button) -> Option<&str>;

fn label(button: &Button) -> Option<&str> {
    button.label.as_deref()
}

fn id(button: &Button) -> Option<&str> {
    button.id.as_deref()
}

fn value(button: &Button) -> Option<&str> {
    button.value.as_deref()
}

/// Text matchers try labels first, then ids, then values. A label that reads
/// "Yes" wins over another button whose id is "Yes".
const TEXT_FIELDS: [ButtonField; 3] = [label, id, value];

fn reply_from_list<'a>(list: &'a [Button], matcher: &SelectMatcher) -> Option<&'a str> {
    if let Some(reply) = matcher
        .index()
        .and_then(|index| list.get(index))
        .and_then(Button::reply_text)
    {
        return Some(reply);
    }

    let SelectMatcher::Text(text) = matcher else {
        return None;
    };
    TEXT_FIELDS.iter().find_map(|field| {
        list.iter()
            .filter(|button| field(*button) == Some(text.as_str()))
            .find_map(Button::reply_text)
    })
}

/// Picks the reply for a `select` step from the buttons of `turns`.
///
/// Button lists are scanned in arrival order and the first list that yields
/// something to send back wins. Within a list, a position match comes first,
/// then labels, ids and values in that order.
pub fn select_option(turns: &[Turn], matcher: &SelectMatcher) -> Result<String> {
    let lists: Vec<&[Button]> = turns.iter().flat_map(Turn::button_lists).collect();
    if lists.is_empty() {
        return Err(Error::NoMatchingOption {
            matcher: matcher.to_string(),
        });
    }

    lists
        .into_iter()
        .find_map(|list| reply_from_list(list, matcher))
        .map(str::to_string)
        .ok_or_else(|| Error::OptionNotFound {
            matcher: matcher.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Fragment;
    use crate::platform::types::ButtonsContent;
    use crate::platform::{ChunkId, UiContent, UiContentEvent};
    use rstest::rstest;

    fn button(id: &str, label: &str) -> Button {
        Button {
            id: Some(id.into()),
            label: Some(label.into()),
            value: None,
        }
    }

    fn turn_with(buttons: Vec<Button>) -> Turn {
        let fragment = Fragment::from_ui_content(
            UiContentEvent {
                app_id: None,
                session_id: None,
                request_id: Some("r1".into()),
                message_id: Some("m1".into()),
                chunk_id: Some(ChunkId::new("1")),
                ts: None,
                content: UiContent::Buttons(ButtonsContent {
                    list: buttons,
                    label: None,
                }),
            },
            "poa",
            "s1",
        )
        .unwrap();
        Turn::from_fragments(vec![fragment]).unwrap()
    }

    #[rstest]
    #[case::by_index(SelectMatcher::Index(0), "Yes")]
    #[case::by_index_text(SelectMatcher::Text("1".into()), "No")]
    #[case::by_id(SelectMatcher::Text("b".into()), "No")]
    #[case::by_label(SelectMatcher::Text("Yes".into()), "Yes")]
    fn selects_by_index_id_or_label(#[case] matcher: SelectMatcher, #[case] expected: &str) {
        let turns = vec![turn_with(vec![button("a", "Yes"), button("b", "No")])];
        assert_eq!(select_option(&turns, &matcher).unwrap(), expected);
    }

    #[rstest]
    #[case::label_beats_other_buttons_id(SelectMatcher::Text("Yes".into()), "Yes")]
    #[case::id_when_no_label_matches(SelectMatcher::Text("Maybe".into()), "Later")]
    #[case::index_beats_label(SelectMatcher::Text("0".into()), "No")]
    fn label_is_preferred_over_id(#[case] matcher: SelectMatcher, #[case] expected: &str) {
        let turns = vec![turn_with(vec![
            button("Yes", "No"),
            button("b", "Yes"),
            button("Maybe", "Later"),
            button("0", "Zero"),
        ])];
        assert_eq!(select_option(&turns, &matcher).unwrap(), expected);
    }

    #[test]
    fn falls_back_to_value_when_label_is_empty() {
        let turns = vec![turn_with(vec![Button {
            id: Some("a".into()),
            label: None,
            value: Some("confirm".into()),
        }])];
        assert_eq!(
            select_option(&turns, &SelectMatcher::Text("confirm".into())).unwrap(),
            "confirm"
        );
    }

    #[test]
    fn no_buttons_is_no_matching_option() {
        let err = select_option(&[], &SelectMatcher::Index(0)).unwrap_err();
        assert!(matches!(err, Error::NoMatchingOption { .. }));
    }

    #[test]
    fn unmatched_matcher_is_option_not_found() {
        let turns = vec![turn_with(vec![button("a", "Yes")])];
        let err = select_option(&turns, &SelectMatcher::Text("Maybe".into())).unwrap_err();
        assert!(matches!(err, Error::OptionNotFound { .. }));
    }

    #[test]
    fn later_lists_are_searched_when_earlier_ones_do_not_match() {
        let turns = vec![
            turn_with(vec![button("a", "Yes")]),
            turn_with(vec![button("x", "Tickets"), button("y", "Hours")]),
        ];
        assert_eq!(
            select_option(&turns, &SelectMatcher::Text("y".into())).unwrap(),
            "Hours"
        );
    }
}
