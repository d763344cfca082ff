//! Block partitioning: binary block-switching tree search and joint-stereo
//! pairing.

use crate::bgmc::BgmcSink;
use crate::block::{self, Block};
use crate::config::{BsMergeAlgorithm, SpecificConfig, StageOptions};
use crate::signal::HistoryView;

/// A node of the binary block-switching tree: either a leaf holding one
/// analyzed [`Block`], or an internal node holding its two children plus
/// the analysis of treating the combined span as a single block.
pub enum TreeNode {
    Leaf(Block),
    Split {
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        merged: Option<Box<Block>>,
    },
}

impl TreeNode {
    /// The cheaper of: the sum of this node's children's costs, or (when
    /// computed) the cost of coding this span as a single merged block.
    pub fn bit_cost(&self) -> u32 {
        match self {
            TreeNode::Leaf(b) => b.bit_cost,
            TreeNode::Split { left, right, merged } => {
                let split_cost = left.bit_cost() + right.bit_cost();
                match merged {
                    Some(m) if m.bit_cost < split_cost => m.bit_cost,
                    _ => split_cost,
                }
            }
        }
    }

    /// Whether this node ultimately codes as one block (a leaf, or a split
    /// whose merge won).
    pub fn is_merged(&self) -> bool {
        match self {
            TreeNode::Leaf(_) => true,
            TreeNode::Split { left, right, merged } => {
                matches!(merged, Some(m) if m.bit_cost < left.bit_cost() + right.bit_cost())
            }
        }
    }

    /// Flattens this subtree into the final leaf sequence, respecting
    /// whichever choice (split or merge) was cheaper at each node.
    pub fn flatten(self) -> Vec<Block> {
        match self {
            TreeNode::Leaf(b) => vec![b],
            TreeNode::Split { left, right, merged } => {
                let split_cost = left.bit_cost() + right.bit_cost();
                match merged {
                    Some(m) if m.bit_cost < split_cost => vec![*m],
                    _ => {
                        let mut out = left.flatten();
                        out.extend(right.flatten());
                        out
                    }
                }
            }
        }
    }
}

/// Generates the set of block sizes for a binary block-switching tree of
/// `depth` levels over `frame_length` samples: `frame_length
/// / 2^depth` equal-length leaves, one per depth level down to 0.
pub fn gen_block_sizes(frame_length: usize, depth: u8) -> Vec<usize> {
    let parts = 1usize << depth;
    vec![frame_length / parts.max(1); parts.max(1)]
}

/// Recursively analyzes and merges the block-switching tree for one
/// channel's span of `length` samples starting at `history`'s logical
/// index 0, down to `max_depth` levels (bottom-up or full-search, per
/// `options.merge`).
pub fn build_tree(
    history: &HistoryView,
    length: usize,
    depth_remaining: u8,
    config: &SpecificConfig,
    options: &StageOptions,
    ra_block: bool,
    coder: &mut dyn BgmcSink,
) -> TreeNode {
    if depth_remaining == 0 || length < 2 {
        let leaf = block::analyze_block(history, length, config, options, ra_block, coder);
        return TreeNode::Leaf(leaf);
    }

    let half = length / 2;
    let left_view = *history;
    let right_view = history.advance(half);

    let left = build_tree(&left_view, half, depth_remaining - 1, config, options, ra_block, coder);
    let right = build_tree(&right_view, length - half, depth_remaining - 1, config, options, false, coder);

    let merged = match options.merge {
        BsMergeAlgorithm::BottomUp => {
            // Only attempt the merge if neither child itself merged further
            // down (a cheap bottom-up heuristic: compare one level at a time).
            if left.is_merged() && right.is_merged() {
                Some(Box::new(block::analyze_block(history, length, config, options, ra_block, coder)))
            } else {
                None
            }
        }
        BsMergeAlgorithm::FullSearch => {
            Some(Box::new(block::analyze_block(history, length, config, options, ra_block, coder)))
        }
    };

    TreeNode::Split { left: Box::new(left), right: Box::new(right), merged }
}

/// The transmitted width, in bits, of one channel's BS-info word at a given
/// `block_switching` depth: `1 << max(3, block_switching)`, one bit
/// for `independent_bs` plus one split bit per heap-indexed internal node
/// down to `max(3, block_switching)` levels. The width never shrinks below
/// 8 bits (matching the reference's minimum-depth-3 encoding) and grows to
/// the full 32 bits once `block_switching` reaches 5.
pub fn bs_info_len(block_switching: u8) -> usize {
    1usize << (block_switching.max(3) as u32)
}

/// BS-info: the binary tree shape encoded as a **fixed**-width bit sequence
/// (`BS-info word`), not a variable-length preorder traversal. The
/// leading bit is `independent_bs` (: bit position 31, meaningful only
/// when joint stereo is active); the remaining `bs_info_len(block_switching)
/// - 1` bits are one split bit per heap-indexed node (root `n=0`, children
/// `2n+1`/`2n+2`), `1` meaning "split further" and `0` meaning "leaf or
/// merged". Node positions the actual tree never reaches (because
/// `block_switching < 3`, or because a shallower merge won) are zero-filled
/// rather than omitted, so every frame with the same `block_switching`
/// config writes exactly the same number of bits regardless of which tree
/// shape was chosen.
pub fn encode_bs_info(node: &TreeNode, block_switching: u8, independent_bs: bool) -> Vec<bool> {
    let width_depth = block_switching.max(3) as usize;
    let node_count = (1usize << width_depth) - 1;
    let mut bits = vec![false; node_count];
    fill_bs_bits(node, 0, block_switching as usize, &mut bits);

    let mut out = Vec::with_capacity(node_count + 1);
    out.push(independent_bs);
    out.extend(bits);
    out
}

fn fill_bs_bits(node: &TreeNode, n: usize, depth_remaining: usize, bits: &mut [bool]) {
    if depth_remaining == 0 || n >= bits.len() {
        return;
    }
    if let TreeNode::Split { left, right, merged } = node {
        let split_cost = left.bit_cost() + right.bit_cost();
        let merged_wins = matches!(merged, Some(m) if m.bit_cost < split_cost);
        if !merged_wins {
            bits[n] = true;
            fill_bs_bits(left, 2 * n + 1, depth_remaining - 1, bits);
            fill_bs_bits(right, 2 * n + 2, depth_remaining - 1, bits);
        }
    }
}

/// Joint-stereo pairing: for each adjacent channel pair, compares coding
/// the pair independently against coding one channel plus the
/// channel-difference signal, keeping whichever is cheaper, subject to
/// top-level override: independent coding only wins if it beats the
/// dependent total by more than the extra `bs_info_len` bits an
/// independently-coded pair must additionally carry (`independent_bs`).
pub struct JsDecision {
    pub use_difference: bool,
    /// Whether this pair is ultimately coded as two independent channels
    /// (`independent_bs`, written as the leading bit of each
    /// channel's BS-info word when joint stereo is active).
    pub independent_bs: bool,
    pub independent_cost: u32,
    pub difference_cost: u32,
}

pub fn gen_js_infos(
    left_tree: &TreeNode,
    right_tree: &TreeNode,
    diff_tree: &TreeNode,
    block_switching: u8,
) -> JsDecision {
    let independent_cost = left_tree.bit_cost() + right_tree.bit_cost();
    // Coding channel 0 plus the difference signal in place of channel 1.
    let difference_cost = left_tree.bit_cost() + diff_tree.bit_cost();
    let len = bs_info_len(block_switching) as u32;
    //  last paragraph: "if C_ind + bs_info_len < C_dep, mark both
    // channels independent; else accept joint coding."
    let independent_bs = independent_cost + len < difference_cost;
    JsDecision {
        use_difference: !independent_bs,
        independent_bs,
        independent_cost,
        difference_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgmc::RangeCoder;
    use crate::config::{
        AdaptSearchAlgorithm, EcBitCountAlgorithm, EcParamAlgorithm, EcSubAlgorithm, LtpCoeffAlgorithm,
        RaFlag, Resolution,
    };

    fn test_config() -> SpecificConfig {
        SpecificConfig {
            channels: 1,
            sample_rate: 48_000,
            total_samples: Some(256),
            resolution: Resolution::Bits16,
            floating: false,
            msb_first: false,
            frame_length: 256,
            ra_distance: 1,
            ra_flag: RaFlag::Frames,
            adapt_order: true,
            coef_table: 0,
            long_term_prediction: false,
            max_order: 8,
            block_switching: 2,
            bgmc: false,
            sb_part: true,
            joint_stereo: false,
            mc_coding: false,
            chan_config: false,
            chan_sort: false,
            crc_enabled: true,
            rlslms: false,
        }
    }

    fn test_options() -> StageOptions {
        StageOptions {
            check_constant: true,
            check_lsbs: true,
            max_order: 8,
            ec_sub: EcSubAlgorithm::RiceEstimate,
            ec_param: EcParamAlgorithm::RiceEstimate,
            ec_bit_count: EcBitCountAlgorithm::Estimate,
            adapt_search: AdaptSearchAlgorithm::ValleyDetect,
            ltp_coeff: LtpCoeffAlgorithm::Fixed,
            merge: BsMergeAlgorithm::BottomUp,
        }
    }

    #[test]
    fn gen_block_sizes_halves_at_each_depth() {
        assert_eq!(gen_block_sizes(256, 0), vec![256]);
        assert_eq!(gen_block_sizes(256, 2), vec![64; 4]);
    }

    #[test]
    fn build_tree_flattens_to_correct_total_length() {
        let data = vec![1i32; 280];
        let view = HistoryView::new(&data, 20);
        let config = test_config();
        let options = test_options();
        let mut coder = RangeCoder::default();
        let tree = build_tree(&view, 256, 2, &config, &options, true, &mut coder);
        let total_cost_before = tree.bit_cost();
        let blocks = tree.flatten();
        let total_len: usize = blocks.iter().map(|b| b.length).sum();
        assert_eq!(total_len, 256);
        assert!(total_cost_before > 0);
    }

    #[test]
    fn js_decision_prefers_difference_for_identical_channels() {
        let data = vec![42i32; 280];
        let zeros = vec![0i32; 280];
        let config = test_config();
        let options = test_options();
        let mut coder = RangeCoder::default();
        let left_view = HistoryView::new(&data, 20);
        let right_view = HistoryView::new(&data, 20);
        let diff_view = HistoryView::new(&zeros, 20);
        let left = build_tree(&left_view, 256, 0, &config, &options, true, &mut coder);
        let right = build_tree(&right_view, 256, 0, &config, &options, true, &mut coder);
        let diff = build_tree(&diff_view, 256, 0, &config, &options, true, &mut coder);
        let decision = gen_js_infos(&left, &right, &diff, config.block_switching);
        assert!(decision.use_difference);
        assert!(!decision.independent_bs);
    }

    #[test]
    fn bs_info_is_fixed_width_regardless_of_tree_shape() {
        let config = test_config();
        let options = test_options();
        let mut coder = RangeCoder::default();

        let flat_data = vec![7i32; 280];
        let flat_view = HistoryView::new(&flat_data, 20);
        let flat_tree = build_tree(&flat_view, 256, 2, &config, &options, true, &mut coder);

        let mut varied_data = vec![0i32; 280];
        for (i, s) in varied_data.iter_mut().enumerate() {
            *s = ((i as f64 * 0.7).sin() * 2000.0) as i32;
        }
        let varied_view = HistoryView::new(&varied_data, 20);
        let varied_tree = build_tree(&varied_view, 256, 2, &config, &options, true, &mut coder);

        let expected_len = bs_info_len(config.block_switching);
        assert_eq!(encode_bs_info(&flat_tree, config.block_switching, false).len(), expected_len);
        assert_eq!(encode_bs_info(&varied_tree, config.block_switching, false).len(), expected_len);
    }

    #[test]
    fn bs_info_len_matches_max_of_three_and_block_switching() {
        assert_eq!(bs_info_len(0), 8);
        assert_eq!(bs_info_len(2), 8);
        assert_eq!(bs_info_len(3), 8);
        assert_eq!(bs_info_len(5), 32);
    }
}
