//! Property-based tests for reply assembly

use super::*;
use proptest::prelude::*;

fn arb_chunks() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-zA-Z0-9 .,!?]{0,12}", 1..20)
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    prop_oneof![
        "[a-z ]{0,8}".prop_map(|content| Frame::Chunk { content }),
        Just(Frame::Complete),
        "[a-z ]{1,8}".prop_map(|message| Frame::Error { message }),
    ]
}

fn apply_all(frames: impl IntoIterator<Item = Frame>) -> (ReplyState, Vec<Effect>) {
    let mut state = ReplyState::Idle;
    let mut effects = vec![];
    for frame in frames {
        if let Ok(result) = transition(&state, frame) {
            state = result.next;
            effects.extend(result.effects);
        }
    }
    (state, effects)
}

proptest! {
    #[test]
    fn finalized_text_is_concatenation(chunks in arb_chunks()) {
        let expected: String = chunks.concat();
        let frames = chunks
            .into_iter()
            .map(|content| Frame::Chunk { content })
            .chain(std::iter::once(Frame::Complete));
        let (state, effects) = apply_all(frames);

        prop_assert_eq!(state, ReplyState::Idle);
        prop_assert_eq!(effects.last(), Some(&Effect::FinalizeReply { text: expected }));
    }

    #[test]
    fn appended_fragments_match_streaming_buffer(chunks in arb_chunks()) {
        let frames = chunks.iter().cloned().map(|content| Frame::Chunk { content });
        let (state, effects) = apply_all(frames);

        let visible: String = effects
            .iter()
            .filter_map(|e| match e {
                Effect::AppendFragment { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(state, ReplyState::Streaming { text: visible });
    }

    #[test]
    fn every_finalize_is_preceded_by_open(frames in proptest::collection::vec(arb_frame(), 0..40)) {
        let (_, effects) = apply_all(frames);
        let mut open = false;
        for effect in effects {
            match effect {
                Effect::OpenReply => {
                    prop_assert!(!open, "reply opened twice");
                    open = true;
                }
                Effect::FinalizeReply { .. } | Effect::AbandonReply => {
                    prop_assert!(open, "closed a reply that was never opened");
                    open = false;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn error_never_finalizes(chunks in arb_chunks(), message in "[a-z]{1,10}") {
        let frames = chunks
            .into_iter()
            .map(|content| Frame::Chunk { content })
            .chain(std::iter::once(Frame::Error { message }));
        let (state, effects) = apply_all(frames);

        prop_assert_eq!(state, ReplyState::Idle);
        let finalized = effects
            .iter()
            .any(|e| matches!(e, Effect::FinalizeReply { .. }));
        prop_assert!(!finalized);
    }
}
