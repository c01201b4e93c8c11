/// Alignment composition across a pivot language.
///
/// Two pivoted translations give `P(source | pivot)` and `P(pivot | target)`
/// per sentence; marginalizing the pivot yields
/// `P(s_i | t_k) = sum_j P(s_i | q_j) * P(q_j | t_k)`. The catch is that the
/// pivot text is tokenized twice, once as the first half's target and once as
/// the second half's source, and the two tokenizations need not agree. The
/// mismatch is bridged in byte space: the second half's pivot columns are
/// redistributed onto the first half's pivot tokens proportionally to the
/// byte overlap of their ranges, then the matrices are multiplied in token
/// space.
use crate::annotation::ByteRange;
use crate::response::{Alignment, Response};

/// Composes per-sentence alignments of the two pivot halves into
/// source-to-target alignments. Both halves must carry alignments and agree
/// on the sentence count; a mismatch means the pivot contract was broken and
/// aborts.
pub fn remap_alignments(first: &Response, second: &Response) -> Vec<Alignment> {
    assert_eq!(
        first.target.num_sentences(),
        second.source.num_sentences(),
        "sentence counts diverged between pivot halves"
    );
    assert_eq!(
        first.alignments.len(),
        second.alignments.len(),
        "pivot halves must both carry alignments"
    );

    let mut remapped = Vec::with_capacity(first.alignments.len());
    for sentence_idx in 0..first.alignments.len() {
        let source_pivot = &first.alignments[sentence_idx];
        let pivot_target = &second.alignments[sentence_idx];

        // Pivot token ranges as produced by the first half and as consumed
        // by the second; both index the same text, so offsets are comparable.
        let produced: Vec<ByteRange> = (0..first.target.num_words(sentence_idx))
            .map(|word| first.target.word_as_range(sentence_idx, word))
            .collect();
        let consumed: Vec<ByteRange> = (0..second.source.num_words(sentence_idx))
            .map(|word| second.source.word_as_range(sentence_idx, word))
            .collect();
        let weights = transfer_weights(&produced, &consumed);

        let source_words = source_pivot.first().map_or(0, Vec::len);
        let mut output: Alignment = vec![vec![0.0; source_words]; pivot_target.len()];
        for &(produced_idx, consumed_idx, weight) in &weights {
            for (target_idx, pivot_row) in pivot_target.iter().enumerate() {
                let mass = pivot_row[consumed_idx] * weight;
                if mass == 0.0 {
                    continue;
                }
                for (source_idx, &prob) in source_pivot[produced_idx].iter().enumerate() {
                    output[target_idx][source_idx] += mass * prob;
                }
            }
        }

        #[cfg(debug_assertions)]
        for (target_idx, row) in output.iter().enumerate() {
            let before: f32 = pivot_target[target_idx].iter().sum();
            let after: f32 = row.iter().sum();
            debug_assert!(
                (before - after).abs() < 1e-3,
                "alignment mass changed in remap: {before} -> {after}"
            );
        }

        remapped.push(output);
    }
    remapped
}

/// Two-pointer walk over the two pivot tokenizations. Exactly matching
/// ranges transfer their probability 1-for-1; otherwise a consumed token's
/// column is spread over every produced token it intersects, weighted by
/// `overlap / |consumed|`. The pointer whose range ends first advances, both
/// on a tie.
fn transfer_weights(
    produced: &[ByteRange],
    consumed: &[ByteRange],
) -> Vec<(usize, usize, f32)> {
    let mut weights = Vec::new();
    let mut p = 0;
    let mut c = 0;
    while p < produced.len() && c < consumed.len() {
        let produced_range = produced[p];
        let consumed_range = consumed[c];
        if produced_range == consumed_range {
            weights.push((p, c, 1.0));
            p += 1;
            c += 1;
            continue;
        }
        let overlap = produced_range
            .end
            .min(consumed_range.end)
            .saturating_sub(produced_range.begin.max(consumed_range.begin));
        if overlap > 0 {
            weights.push((p, c, overlap as f32 / consumed_range.size() as f32));
        }
        if produced_range.end < consumed_range.end {
            p += 1;
        } else if consumed_range.end < produced_range.end {
            c += 1;
        } else {
            p += 1;
            c += 1;
        }
    }
    weights
}

/// Stitches the two halves of a pivoted translation into one [`Response`]:
/// the first half contributes the source, the second half the target and
/// quality scores, and the alignments are remapped across the pivot.
pub fn combine_pivoted(first: Response, second: Response) -> Response {
    assert_eq!(
        first.source.num_sentences(),
        second.source.num_sentences(),
        "sentence counts diverged between pivot halves"
    );
    let alignments = remap_alignments(&first, &second);
    Response {
        source: first.source,
        target: second.target,
        alignments,
        quality_scores: second.quality_scores,
    }
}
