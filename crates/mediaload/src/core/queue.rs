use super::arena::{Arena, LoaderId};

/// Intrusive list links stored inside each loader.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueueLinks {
    prev:     Option<LoaderId>,
    next:     Option<LoaderId>,
    queued:   bool,
    /// Priority generation captured when the loader was last placed.
    priority: u64,
}

impl QueueLinks {
    pub fn is_queued(&self) -> bool { self.queued }

    pub fn priority(&self) -> u64 { self.priority }
}

pub(crate) trait Queued {
    fn links(&self) -> &QueueLinks;
    fn links_mut(&mut self) -> &mut QueueLinks;
}

/// How a `start()` call wants its loader positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub load_first: bool,
    pub prior:      bool,
}

/// Ordered set of loaders waiting on one endpoint, with the number of
/// requests currently outstanding against it.
///
/// Loaders stamped with the current priority generation form the front of
/// the queue. The queue holds ids only; the loaders live in an [`Arena`].
#[derive(Debug)]
pub(crate) struct LoaderQueue {
    head:      Option<LoaderId>,
    tail:      Option<LoaderId>,
    len:       usize,
    in_flight: usize,
    limit:     usize,
}

impl LoaderQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            in_flight: 0,
            limit: limit.max(1),
        }
    }

    pub fn head(&self) -> Option<LoaderId> { self.head }

    pub fn len(&self) -> usize { self.len }

    pub fn in_flight(&self) -> usize { self.in_flight }

    pub fn has_capacity(&self) -> bool { self.in_flight < self.limit }

    pub fn acquire(&mut self) { self.in_flight += 1; }

    pub fn release(&mut self) { self.in_flight = self.in_flight.saturating_sub(1); }

    pub fn next_of<T: Queued>(arena: &Arena<T>, id: LoaderId) -> Option<LoaderId> {
        arena.get(id).and_then(|item| item.links().next)
    }

    pub fn iter<'a, T: Queued>(&self, arena: &'a Arena<T>) -> impl Iterator<Item = LoaderId> + 'a {
        std::iter::successors(self.head, move |id| Self::next_of(arena, *id))
    }

    /// Position `id` according to `placement` and stamp it with the
    /// generation it now belongs to.
    ///
    /// - `prior && load_first`: front of the queue.
    /// - `prior && !load_first`: end of the current generation.
    /// - `!prior && load_first`: right behind the current generation.
    /// - `!prior && !load_first`: end of the queue.
    pub fn place<T: Queued>(
        &mut self,
        arena: &mut Arena<T>,
        id: LoaderId,
        placement: Placement,
        current: u64,
    ) {
        let Some(item) = arena.get(id) else {
            return;
        };
        let stamp = if placement.prior {
            current
        } else {
            item.links().priority
        };
        let before = match (placement.prior, placement.load_first) {
            (true, true) => self.first_where(arena, id, |_| true),
            (false, false) => None,
            _ => self.first_where(arena, id, |links| links.priority < current),
        };
        self.remove(arena, id);
        if let Some(item) = arena.get_mut(id) {
            item.links_mut().priority = stamp;
        }
        self.insert_before(arena, id, before);
    }

    pub fn remove<T: Queued>(&mut self, arena: &mut Arena<T>, id: LoaderId) {
        let Some(item) = arena.get_mut(id) else {
            return;
        };
        let links = item.links_mut();
        if !links.queued {
            return;
        }
        let (prev, next) = (links.prev.take(), links.next.take());
        links.queued = false;

        match prev.and_then(|prev| arena.get_mut(prev)) {
            Some(prev) => prev.links_mut().next = next,
            None => self.head = next,
        }
        match next.and_then(|next| arena.get_mut(next)) {
            Some(next) => next.links_mut().prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    fn first_where<T: Queued>(
        &self,
        arena: &Arena<T>,
        skip: LoaderId,
        predicate: impl Fn(&QueueLinks) -> bool,
    ) -> Option<LoaderId> {
        self.iter(arena).filter(|id| *id != skip).find(|id| {
            arena
                .get(*id)
                .is_some_and(|item| predicate(item.links()))
        })
    }

    /// Link `id` in front of `before`, or at the tail when `before` is `None`.
    fn insert_before<T: Queued>(&mut self, arena: &mut Arena<T>, id: LoaderId, before: Option<LoaderId>) {
        let prev = match before {
            Some(before) => arena.get(before).and_then(|item| item.links().prev),
            None => self.tail,
        };
        let Some(item) = arena.get_mut(id) else {
            return;
        };
        let links = item.links_mut();
        links.prev = prev;
        links.next = before;
        links.queued = true;

        match prev.and_then(|prev| arena.get_mut(prev)) {
            Some(prev) => prev.links_mut().next = Some(id),
            None => self.head = Some(id),
        }
        match before.and_then(|before| arena.get_mut(before)) {
            Some(before) => before.links_mut().prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }
}
