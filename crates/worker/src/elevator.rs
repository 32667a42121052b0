//! 防饥饿的优先级提升
//!
//! 每次提升都把所有非空优先级带整体向最高优先级方向压缩，消除空带，
//! 原先位于最高优先级带的调度单元排在压缩后最高带的末尾。
//! 长期等待的低优先级工作因此最终一定会到达最高优先级带。

use std::collections::VecDeque;

use tracing::debug;

use crate::scheduler::Scheduler;

/// 压缩优先级带，返回提升后最高带中的调度单元数量
pub fn elevate_bands<T>(bands: &mut [VecDeque<T>]) -> usize {
    let Some((head, rest)) = bands.split_first_mut() else {
        return 0;
    };

    let recycled = std::mem::take(head);
    let mut next = 0;

    for index in 0..rest.len() {
        if rest[index].is_empty() {
            continue;
        }
        let contents = std::mem::take(&mut rest[index]);
        if next == 0 {
            *head = contents;
        } else {
            rest[next - 1] = contents;
        }
        next += 1;
    }

    head.extend(recycled);
    head.len()
}

impl Scheduler {
    /// 执行一次优先级提升，与 `schedule`/`run` 共用同一把锁
    pub fn elevate(&self) {
        let mut bands = self.lock_bands();
        let queued: usize = bands.iter().map(VecDeque::len).sum();
        let head = elevate_bands(&mut bands);
        if queued > 0 {
            debug!("优先级提升完成，最高优先级带中有 {} 个调度单元", head);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands(layout: &[(usize, &[u32])]) -> Vec<VecDeque<u32>> {
        let mut bands: Vec<VecDeque<u32>> = (0..8).map(|_| VecDeque::new()).collect();
        for (band, items) in layout {
            bands[*band].extend(items.iter().copied());
        }
        bands
    }

    fn flatten(bands: &[VecDeque<u32>]) -> Vec<Vec<u32>> {
        bands.iter().map(|b| b.iter().copied().collect()).collect()
    }

    #[test]
    fn test_gaps_are_closed_in_order() {
        let mut b = bands(&[(2, &[1, 2]), (5, &[3]), (7, &[4, 5])]);
        elevate_bands(&mut b);
        assert_eq!(
            flatten(&b),
            vec![vec![1, 2], vec![3], vec![4, 5], vec![], vec![], vec![], vec![], vec![]]
        );
    }

    #[test]
    fn test_head_band_is_recycled_behind_promoted_work() {
        let mut b = bands(&[(0, &[1, 2]), (3, &[3]), (4, &[4])]);
        let head = elevate_bands(&mut b);
        assert_eq!(head, 3);
        assert_eq!(flatten(&b)[0], vec![3, 1, 2]);
        assert_eq!(flatten(&b)[1], vec![4]);
        assert!(b[2..].iter().all(VecDeque::is_empty));
    }

    #[test]
    fn test_only_head_band_is_stable() {
        let mut b = bands(&[(0, &[1, 2, 3])]);
        elevate_bands(&mut b);
        assert_eq!(flatten(&b)[0], vec![1, 2, 3]);
    }

    #[test]
    fn test_everything_reaches_head_band_eventually() {
        let mut b = bands(&[(6, &[1]), (7, &[2])]);
        elevate_bands(&mut b);
        assert_eq!(flatten(&b)[0], vec![1]);
        elevate_bands(&mut b);
        assert_eq!(flatten(&b)[0], vec![2, 1]);
    }

    #[test]
    fn test_empty_input() {
        let mut empty: Vec<VecDeque<u32>> = Vec::new();
        assert_eq!(elevate_bands(&mut empty), 0);
    }
}
