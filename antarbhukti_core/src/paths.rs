//! Bounded enumeration of the execution paths of a [`Net`].

use crate::net::{Net, NetTransitionId, Place};
use serde::{Deserialize, Serialize};

/// Bounds on the length of enumerated paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathBounds {
    /// How many times a place may be re-entered within one path.
    pub max_loop_unroll: u32,
    /// Maximum number of transitions in one path.
    pub max_path_len: Option<usize>,
}

impl Default for PathBounds {
    fn default() -> Self {
        Self {
            max_loop_unroll: 2,
            max_path_len: None,
        }
    }
}

/// A path from the initial place to a terminal place, to a truncation point,
/// or to a place where the SFC halts because no outgoing guard holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    /// The places visited, starting from the initial one.
    pub places: Vec<Place>,
    /// The transitions fired, one fewer than the places.
    pub transitions: Vec<NetTransitionId>,
    /// The first transition that was not followed because of the bounds, if any.
    pub truncated_by: Option<NetTransitionId>,
    /// Whether the path stops at a non-terminal place,
    /// assuming every outgoing guard is false there.
    pub halted: bool,
}

impl Path {
    /// Whether the path was cut short by the bounds rather than reaching a terminal place.
    pub fn bounded_truncation(&self) -> bool {
        self.truncated_by.is_some()
    }

    /// The place the path ends in.
    pub fn last(&self) -> Place {
        self.places[self.places.len() - 1]
    }
}

#[derive(Debug)]
struct Frame {
    place: Place,
    next: usize,
    blocked: Option<NetTransitionId>,
}

/// Lazy depth-first enumeration of the paths of a [`Net`].
///
/// Outgoing transitions are explored in declaration order,
/// so the enumeration order is deterministic.
/// Guards are not evaluated: every structurally possible path is produced.
/// A place whose outgoing transitions are all guarded also ends a path,
/// standing for the runs that halt there.
#[derive(Debug)]
pub struct Paths<'a> {
    net: &'a Net,
    bounds: PathBounds,
    stack: Vec<Frame>,
    transitions: Vec<NetTransitionId>,
    visits: Vec<u32>,
}

impl Net {
    /// Enumerates the paths of the net within the given bounds.
    ///
    /// Every call starts a fresh enumeration.
    pub fn paths(&self, bounds: &PathBounds) -> Paths<'_> {
        let mut visits = vec![0; self.places().count()];
        let initial = self.initial_marking();
        visits[initial.index()] = 1;
        Paths {
            net: self,
            bounds: *bounds,
            stack: vec![Frame {
                place: initial,
                next: 0,
                blocked: None,
            }],
            transitions: Vec::new(),
            visits,
        }
    }
}

impl Iterator for Paths<'_> {
    type Item = Path;

    fn next(&mut self) -> Option<Path> {
        let net = self.net;
        loop {
            let too_long = self
                .bounds
                .max_path_len
                .is_some_and(|len| self.transitions.len() >= len);
            let frame = self.stack.last_mut()?;
            let outgoing = net.place(frame.place).outgoing();
            if let Some(&t) = outgoing.get(frame.next) {
                frame.next += 1;
                let post = net.transition(t).post();
                if too_long || self.visits[post.index()] > self.bounds.max_loop_unroll {
                    frame.blocked.get_or_insert(t);
                } else {
                    self.visits[post.index()] += 1;
                    self.transitions.push(t);
                    self.stack.push(Frame {
                        place: post,
                        next: 0,
                        blocked: None,
                    });
                }
                continue;
            }
            let halted = frame.blocked.is_none() && net.may_halt(frame.place);
            let path = (outgoing.is_empty() || frame.blocked.is_some() || halted).then(|| Path {
                places: self.stack.iter().map(|f| f.place).collect(),
                transitions: self.transitions.clone(),
                truncated_by: self.stack.last().and_then(|f| f.blocked),
                halted,
            });
            if let Some(frame) = self.stack.pop() {
                self.visits[frame.place.index()] -= 1;
                if !self.stack.is_empty() {
                    self.transitions.pop();
                }
            }
            if path.is_some() {
                return path;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Expression;
    use crate::net::to_net;
    use crate::sfc::SfcBuilder;

    fn names(net: &Net, path: &Path) -> Vec<String> {
        path.places
            .iter()
            .map(|p| net.place(*p).name().to_string())
            .collect()
    }

    #[test]
    fn branches_in_declaration_order() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        let c = builder.new_step("C").expect("new step");
        builder.set_initial(a).expect("step exists");
        builder.add_transition(a, c, None).expect("unguarded");
        builder.add_transition(a, b, None).expect("unguarded");
        let net = to_net(&builder.build().expect("valid SFC"));
        let paths: Vec<_> = net.paths(&PathBounds::default()).collect();
        assert_eq!(paths.len(), 2);
        assert_eq!(names(&net, &paths[0]), ["A", "C"]);
        assert_eq!(names(&net, &paths[1]), ["A", "B"]);
        assert!(paths.iter().all(|p| !p.bounded_truncation()));
    }

    #[test]
    fn self_loop_is_unrolled() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let done = builder.new_step("Done").expect("new step");
        builder.set_initial(a).expect("step exists");
        let back = builder.add_transition(a, a, None).expect("unguarded");
        builder.add_transition(a, done, None).expect("unguarded");
        let net = to_net(&builder.build().expect("valid SFC"));

        let bounds = PathBounds {
            max_loop_unroll: 0,
            max_path_len: None,
        };
        let paths: Vec<_> = net.paths(&bounds).collect();
        // The truncated prefix at A, then A -> Done.
        assert_eq!(paths.len(), 2);
        assert_eq!(names(&net, &paths[0]), ["A", "Done"]);
        assert_eq!(names(&net, &paths[1]), ["A"]);
        assert_eq!(paths[1].truncated_by.map(|t| t.index()), Some(back.index()));

        let paths: Vec<_> = net.paths(&PathBounds::default()).collect();
        let lengths: Vec<_> = paths.iter().map(|p| p.places.len()).collect();
        assert_eq!(lengths, [4, 3, 3, 2]);
        assert_eq!(paths.iter().filter(|p| p.bounded_truncation()).count(), 1);
    }

    #[test]
    fn length_bound() {
        let mut builder = SfcBuilder::new();
        let steps: Vec<_> = (0..5)
            .map(|i| builder.new_step(format!("S{i}")).expect("new step"))
            .collect();
        builder.set_initial(steps[0]).expect("step exists");
        for pair in steps.windows(2) {
            builder.add_transition(pair[0], pair[1], None).expect("unguarded");
        }
        let net = to_net(&builder.build().expect("valid SFC"));
        let bounds = PathBounds {
            max_loop_unroll: 2,
            max_path_len: Some(2),
        };
        let paths: Vec<_> = net.paths(&bounds).collect();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].transitions.len(), 2);
        assert!(paths[0].bounded_truncation());
        // Enumeration is repeatable.
        assert_eq!(net.paths(&bounds).collect::<Vec<_>>(), paths);
    }

    #[test]
    fn guarded_places_may_halt() {
        let mut builder = SfcBuilder::new();
        let a = builder.new_step("A").expect("new step");
        let b = builder.new_step("B").expect("new step");
        let c = builder.new_step("C").expect("new step");
        builder.set_initial(a).expect("step exists");
        builder.add_transition(a, b, None).expect("unguarded");
        builder
            .add_transition(b, c, Some(Expression::from(false)))
            .expect("boolean guard");
        let net = to_net(&builder.build().expect("valid SFC"));
        let paths: Vec<_> = net.paths(&PathBounds::default()).collect();
        // A always moves on; B halts when its only guard is false.
        assert_eq!(paths.len(), 2);
        assert_eq!(names(&net, &paths[0]), ["A", "B", "C"]);
        assert!(!paths[0].halted);
        assert_eq!(names(&net, &paths[1]), ["A", "B"]);
        assert!(paths[1].halted);
        assert!(!paths[1].bounded_truncation());
    }
}
