//! Frame-level orchestration: random-access scheduling, joint-stereo
//! difference signal generation, and the three-stage dispatch
//! (joint-stereo -> block-switching -> final) of /

use crate::bgmc::BgmcSink;
use crate::bitstream::BitWriter;
use crate::block;
use crate::config::SpecificConfig;
use crate::error::AlsResult;
use crate::partition;
use crate::signal::HistoryView;

/// Whether the frame currently being encoded starts a random-access unit
///: the first frame of the stream, and every `ra_distance`th
/// frame after it, when RA is enabled at all.
pub fn is_ra_frame(frame_index: u64, ra_distance: u8) -> bool {
    if ra_distance == 0 {
        frame_index == 0
    } else {
        frame_index % ra_distance as u64 == 0
    }
}

/// Encodes one frame's worth of samples for every channel, following the
/// three-stage pipeline: a joint-stereo analysis pass decides
/// per-pair independent-vs-difference coding, a block-switching pass
/// re-derives the winning tree for whichever signal (original or
/// difference) was chosen, and the final stage writes the bitstream using
/// the frame's dedicated (usually higher-quality) options.
///
/// `channel_histories` holds one [`HistoryView`] per channel, each exposing
/// `config.history_pad()` history samples before logical index 0 and at
/// least `frame_length` samples of current-frame data after it.
pub fn encode_frame(
    writer: &mut BitWriter,
    channel_histories: &[HistoryView],
    frame_length: usize,
    config: &SpecificConfig,
    stages: &crate::config::StageTable,
    ra_block: bool,
    coder: &mut dyn BgmcSink,
) -> AlsResult<()> {
    let num_channels = channel_histories.len();

    let mut js_pairs = vec![false; num_channels / 2];
    let mut independent_flags = vec![false; num_channels / 2];
    let mut diff_data: Vec<Vec<i32>> = Vec::new();

    if config.joint_stereo && num_channels >= 2 {
        for pair in 0..num_channels / 2 {
            let left = &channel_histories[pair * 2];
            let right = &channel_histories[pair * 2 + 1];

            let diff: Vec<i32> = (0..(left.history_len() + frame_length))
                .map(|i| {
                    let t = i as isize - left.history_len() as isize;
                    left.at(t) - right.at(t)
                })
                .collect();
            let diff_origin = left.history_len();
            let diff_view = HistoryView::new(&diff, diff_origin);

            let mut coder_js = crate::bgmc::RangeCoder::default();
            let left_tree = partition::build_tree(left, frame_length, 0, config, &stages.joint_stereo, ra_block, &mut coder_js);
            let right_tree = partition::build_tree(right, frame_length, 0, config, &stages.joint_stereo, ra_block, &mut coder_js);
            let diff_tree = partition::build_tree(&diff_view, frame_length, 0, config, &stages.joint_stereo, ra_block, &mut coder_js);

            let decision = partition::gen_js_infos(&left_tree, &right_tree, &diff_tree, config.block_switching);
            js_pairs[pair] = decision.use_difference;
            independent_flags[pair] = decision.independent_bs;
            diff_data.push(diff);
        }
    }

    for pair_or_channel in 0..num_channels {
        let use_difference = config.joint_stereo
            && num_channels >= 2
            && pair_or_channel % 2 == 1
            && js_pairs[pair_or_channel / 2];

        let pair = pair_or_channel / 2;
        let source_view = if use_difference {
            let diff = &diff_data[pair];
            let diff_origin = diff.len() - frame_length;
            HistoryView::new(diff, diff_origin)
        } else {
            channel_histories[pair_or_channel]
        };

        let tree = partition::build_tree(&source_view, frame_length, config.block_switching, config, &stages.block_switching, ra_block, coder);

        let independent_bs = config.joint_stereo && num_channels >= 2 && independent_flags[pair];
        let bs_bits = partition::encode_bs_info(&tree, config.block_switching, independent_bs);
        for bit in &bs_bits {
            writer.write_bits(*bit as u32, 1)?;
        }

        // The block-switching tree above only decides the split shape; the
        // leaves it settled on are re-analyzed here with the frame's
        // dedicated final-stage options (usually exact bit counting and
        // full-search order/entropy search) before anything is written, per
        // the three-pass structure described at the top of this module.
        let leaf_lengths: Vec<usize> = tree.flatten().iter().map(|b| b.length).collect();
        let mut offset = 0usize;
        for (i, &len) in leaf_lengths.iter().enumerate() {
            let leaf_ra = ra_block && i == 0;
            let leaf_view = source_view.advance(offset);
            let final_block = block::analyze_block(&leaf_view, len, config, &stages.final_stage, leaf_ra, coder);
            block::write_block(writer, &final_block, config, use_difference, coder)?;
            offset += len;
        }
    }

    Ok(())
}
