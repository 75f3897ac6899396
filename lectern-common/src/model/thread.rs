//! Reassembling the flat post list into discussion threads.
//!
//! Posts only know their parent's id. [`PostTree`] keeps every post in one
//! arena and indexes it by id and by parent, so there are no references
//! between nodes.

use crate::model::{
    Id,
    post::{EnrichedPost, PostMarker},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reply level below which [`PostTree::threads`] stops nesting.
pub const MAX_THREAD_DEPTH: usize = 32;

#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PostTree {
    posts: Vec<EnrichedPost>,
    by_id: HashMap<Id<PostMarker>, usize>,
    children: HashMap<Id<PostMarker>, Vec<usize>>,
    roots: Vec<usize>,
}

/// One post and all replies below it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Thread {
    pub post: EnrichedPost,
    pub replies: Vec<Thread>,
}

impl PostTree {
    /// Builds the tree from a newest-first list.
    ///
    /// Top-level posts stay newest first, replies below a post are oldest
    /// first. A post whose parent is not part of `posts` becomes a root, and
    /// so does the newest post of any parent loop.
    #[must_use]
    pub fn from_posts(posts: Vec<EnrichedPost>) -> Self {
        let by_id: HashMap<_, _> = posts
            .iter()
            .enumerate()
            .map(|(slot, post)| (post.id, slot))
            .collect();

        let mut children: HashMap<Id<PostMarker>, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (slot, post) in posts.iter().enumerate() {
            match post.parent_id {
                Some(parent_id) if parent_id != post.id && by_id.contains_key(&parent_id) => {
                    children.entry(parent_id).or_default().push(slot);
                }
                _ => roots.push(slot),
            }
        }
        for slots in children.values_mut() {
            slots.reverse();
        }

        // Posts on a parent loop cannot be reached from any root.
        let mut reached = vec![false; posts.len()];
        let mut stack = roots.clone();
        let mut unreached = 0;
        loop {
            while let Some(slot) = stack.pop() {
                if !std::mem::replace(&mut reached[slot], true) {
                    stack.extend(children.get(&posts[slot].id).into_iter().flatten());
                }
            }

            let Some(offset) = reached[unreached..].iter().position(|&seen| !seen) else {
                break;
            };
            let slot = unreached + offset;
            unreached = slot + 1;
            if let Some(siblings) = posts[slot]
                .parent_id
                .and_then(|parent_id| children.get_mut(&parent_id))
            {
                siblings.retain(|&sibling| sibling != slot);
            }
            roots.push(slot);
            stack.push(slot);
        }
        roots.sort_unstable();

        Self {
            posts,
            by_id,
            children,
            roots,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: Id<PostMarker>) -> Option<&EnrichedPost> {
        self.by_id.get(&id).map(|&slot| &self.posts[slot])
    }

    pub fn roots(&self) -> impl Iterator<Item = &EnrichedPost> {
        self.roots.iter().map(|&slot| &self.posts[slot])
    }

    pub fn children(&self, id: Id<PostMarker>) -> impl Iterator<Item = &EnrichedPost> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&slot| &self.posts[slot])
    }

    /// Nested, serializable form of the tree.
    ///
    /// Replies more than [`MAX_THREAD_DEPTH`] levels below their root are
    /// listed flat under their ancestor at that depth, in reply order.
    #[must_use]
    pub fn threads(&self) -> Vec<Thread> {
        let len = self.posts.len();
        let mut depth = vec![0; len];
        let mut attach_to: Vec<Option<usize>> = vec![None; len];
        let mut seen = vec![false; len];
        let mut order = Vec::with_capacity(len);

        let mut stack: Vec<usize> = self.roots.iter().rev().copied().collect();
        while let Some(slot) = stack.pop() {
            if std::mem::replace(&mut seen[slot], true) {
                continue;
            }
            order.push(slot);

            let (child_depth, anchor) = if depth[slot] <= MAX_THREAD_DEPTH {
                (depth[slot] + 1, Some(slot))
            } else {
                (depth[slot], attach_to[slot])
            };
            if let Some(children) = self.children.get(&self.posts[slot].id) {
                for &child in children.iter().rev() {
                    depth[child] = child_depth;
                    attach_to[child] = anchor;
                    stack.push(child);
                }
            }
        }

        // Reverse pre-order finishes every subtree before its parent.
        let mut replies: Vec<Vec<Thread>> = std::iter::repeat_with(Vec::new).take(len).collect();
        let mut threads = Vec::with_capacity(self.roots.len());
        for &slot in order.iter().rev() {
            let mut below = std::mem::take(&mut replies[slot]);
            below.reverse();
            let thread = Thread {
                post: self.posts[slot].clone(),
                replies: below,
            };
            match attach_to[slot] {
                Some(parent) => replies[parent].push(thread),
                None => threads.push(thread),
            }
        }
        threads.reverse();

        threads
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        post::{EnrichedPost, PostMarker},
        thread::{MAX_THREAD_DEPTH, PostTree, Thread},
    };
    use time::{Duration, macros::datetime};

    fn post(id: u64, parent: Option<u64>) -> EnrichedPost {
        EnrichedPost {
            id: id.into(),
            course_id: 1.into(),
            author_id: 1.into(),
            author_name: "Ada".to_owned(),
            author_role: None,
            content: format!("post {id}"),
            parent_id: parent.map(Id::from),
            created_at: datetime!(2025-03-01 12:00 UTC) + Duration::minutes(id.cast_signed()),
        }
    }

    fn ids<'a>(posts: impl Iterator<Item = &'a EnrichedPost>) -> Vec<u64> {
        posts.map(|post| post.id.get()).collect()
    }

    /// Newest first, the way the store lists them.
    fn sample() -> Vec<EnrichedPost> {
        vec![
            post(6, Some(2)),
            post(5, None),
            post(4, Some(1)),
            post(3, Some(1)),
            post(2, Some(1)),
            post(1, None),
        ]
    }

    #[test]
    fn groups_replies_under_parents() {
        let tree = PostTree::from_posts(sample());

        assert_eq!(tree.len(), 6);
        assert_eq!(ids(tree.roots()), [5, 1]);
        assert_eq!(ids(tree.children(1.into())), [2, 3, 4]);
        assert_eq!(ids(tree.children(2.into())), [6]);
        assert_eq!(ids(tree.children(5.into())), Vec::<u64>::new());
        assert_eq!(tree.get(6.into()).unwrap().parent_id, Some(2.into()));
        assert!(tree.get(Id::<PostMarker>::from(99)).is_none());
    }

    #[test]
    fn orphans_become_roots() {
        let tree = PostTree::from_posts(vec![post(8, Some(42)), post(7, None)]);

        assert_eq!(ids(tree.roots()), [8, 7]);
    }

    #[test]
    fn nested_threads() {
        let threads = PostTree::from_posts(sample()).threads();

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].post.id, 5.into());
        assert!(threads[0].replies.is_empty());

        let first = &threads[1];
        assert_eq!(first.post.id, 1.into());
        assert_eq!(
            first
                .replies
                .iter()
                .map(|reply| reply.post.id.get())
                .collect::<Vec<_>>(),
            [2, 3, 4]
        );
        assert_eq!(first.replies[0].replies[0].post.id, 6.into());
    }

    #[test]
    fn empty_tree() {
        let tree = PostTree::from_posts(Vec::new());

        assert!(tree.is_empty());
        assert!(tree.threads().is_empty());
    }

    #[test]
    fn parent_loops_become_roots() {
        let tree = PostTree::from_posts(vec![
            post(12, Some(11)),
            post(11, Some(12)),
            post(10, None),
        ]);

        assert_eq!(ids(tree.roots()), [12, 10]);
        assert_eq!(ids(tree.children(12.into())), [11]);
        assert_eq!(ids(tree.children(11.into())), Vec::<u64>::new());

        let threads = tree.threads();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].replies[0].post.id, 11.into());
    }

    #[test]
    fn long_reply_chains_are_flattened() {
        const CHAIN: u64 = 100_000;
        let posts = (1..=CHAIN)
            .rev()
            .map(|id| post(id, (id > 1).then_some(id - 1)))
            .collect();

        let threads = PostTree::from_posts(posts).threads();

        assert_eq!(threads.len(), 1);
        let mut level: &Thread = &threads[0];
        let mut depth = 0;
        while let [reply, ..] = level.replies.as_slice() {
            level = reply;
            depth += 1;
        }
        assert_eq!(depth, MAX_THREAD_DEPTH + 1);

        let mut anchor = &threads[0];
        for _ in 0..MAX_THREAD_DEPTH {
            anchor = &anchor.replies[0];
        }
        let max_depth = u64::try_from(MAX_THREAD_DEPTH).unwrap();
        assert_eq!(anchor.post.id, (max_depth + 1).into());
        assert_eq!(
            anchor
                .replies
                .iter()
                .map(|reply| reply.post.id.get())
                .collect::<Vec<_>>(),
            ((max_depth + 2)..=CHAIN).collect::<Vec<_>>()
        );

        assert!(serde_json::to_string(&threads).is_ok());
    }
}
