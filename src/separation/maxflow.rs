use std::collections::VecDeque;

const EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
struct FlowEdge {
    to: usize,
    capacity: f64,
    flow: f64,
    rev: usize,
}

/// Dinic max-flow on real-valued capacities, used to find minimum cuts in
/// the value-weighted support graph. Cloning a freshly built network is
/// the cheap way to run many single-source computations over the same
/// arc set.
#[derive(Debug, Clone)]
pub struct MaxFlow {
    graph: Vec<Vec<FlowEdge>>,
    n: usize,
}

impl MaxFlow {
    pub fn new(n: usize) -> Self {
        MaxFlow {
            graph: vec![Vec::new(); n],
            n,
        }
    }

    pub fn add_edge(&mut self, from: usize, to: usize, capacity: f64) {
        let to_len = self.graph[to].len();
        let from_len = self.graph[from].len();
        self.graph[from].push(FlowEdge {
            to,
            capacity,
            flow: 0.0,
            rev: to_len,
        });
        self.graph[to].push(FlowEdge {
            to: from,
            capacity: 0.0,
            flow: 0.0,
            rev: from_len,
        });
    }

    pub fn max_flow(&mut self, s: usize, t: usize) -> f64 {
        if s == t {
            return 0.0;
        }
        let mut total = 0.0;
        let mut level = vec![-1i32; self.n];
        while self.bfs(s, t, &mut level) {
            let mut start = vec![0usize; self.n];
            loop {
                let pushed = self.dfs(s, t, &level, f64::INFINITY, &mut start);
                if pushed <= EPS {
                    break;
                }
                total += pushed;
            }
        }
        total
    }

    /// Source side of a minimum cut: the nodes still reachable in the
    /// residual network. Only meaningful after [`Self::max_flow`].
    pub fn min_cut_side(&self, s: usize) -> Vec<bool> {
        let mut side = vec![false; self.n];
        side[s] = true;
        let mut queue = VecDeque::from([s]);
        while let Some(u) = queue.pop_front() {
            for edge in &self.graph[u] {
                if edge.capacity - edge.flow > EPS && !side[edge.to] {
                    side[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        side
    }

    fn bfs(&self, s: usize, t: usize, level: &mut [i32]) -> bool {
        level.fill(-1);
        level[s] = 0;
        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(u) = queue.pop_front() {
            for edge in &self.graph[u] {
                if edge.capacity - edge.flow > EPS && level[edge.to] == -1 {
                    level[edge.to] = level[u] + 1;
                    queue.push_back(edge.to);
                }
            }
        }
        level[t] != -1
    }

    fn dfs(&mut self, u: usize, t: usize, level: &[i32], flow: f64, start: &mut Vec<usize>) -> f64 {
        if u == t {
            return flow;
        }
        while start[u] < self.graph[u].len() {
            let i = start[u];
            let (residual, to, rev) = {
                let edge = &self.graph[u][i];
                (edge.capacity - edge.flow, edge.to, edge.rev)
            };
            if residual > EPS && level[to] == level[u] + 1 {
                let pushed = self.dfs(to, t, level, flow.min(residual), start);
                if pushed > EPS {
                    self.graph[u][i].flow += pushed;
                    self.graph[to][rev].flow -= pushed;
                    return pushed;
                }
            }
            start[u] += 1;
        }
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_flow() {
        let mut mf = MaxFlow::new(6);
        mf.add_edge(0, 1, 10.0);
        mf.add_edge(0, 2, 10.0);
        mf.add_edge(1, 3, 4.0);
        mf.add_edge(1, 4, 8.0);
        mf.add_edge(2, 4, 9.0);
        mf.add_edge(3, 5, 10.0);
        mf.add_edge(4, 3, 6.0);
        mf.add_edge(4, 5, 10.0);
        assert!((mf.max_flow(0, 5) - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_flow_disconnected() {
        let mut mf = MaxFlow::new(4);
        mf.add_edge(0, 1, 10.0);
        mf.add_edge(2, 3, 5.0);
        assert!(mf.max_flow(0, 3).abs() < 1e-9);
    }

    #[test]
    fn test_fractional_capacities() {
        let mut mf = MaxFlow::new(4);
        mf.add_edge(0, 1, 0.5);
        mf.add_edge(0, 2, 0.25);
        mf.add_edge(1, 3, 0.75);
        mf.add_edge(2, 3, 0.25);
        assert!((mf.max_flow(0, 3) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_min_cut_side() {
        // Bottleneck between {0, 1} and {2, 3}.
        let mut mf = MaxFlow::new(4);
        mf.add_edge(0, 1, 5.0);
        mf.add_edge(1, 2, 1.0);
        mf.add_edge(2, 3, 5.0);
        assert!((mf.max_flow(0, 3) - 1.0).abs() < 1e-9);
        let side = mf.min_cut_side(0);
        assert_eq!(side, vec![true, true, false, false]);
    }
}
