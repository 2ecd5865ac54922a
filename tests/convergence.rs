//! Replicas that see the same operations converge, whatever the order.

use cowrite_core::protocol::codec;
use cowrite_core::{Document, LocalOp, StateVector, Update};
use proptest::prelude::*;

const REPLICAS: usize = 3;

#[derive(Clone, Debug)]
enum Step {
    Insert { replica: usize, pos: usize, text: String },
    Delete { replica: usize, pos: usize, len: usize },
    Format { replica: usize, pos: usize, len: usize, bold: bool },
    /// Deliver one pending update (chosen by `pick`) to `replica`
    Deliver { replica: usize, pick: usize },
    /// Collect tombstones on `replica`; the last replica never counts as
    /// a peer, like a client that went offline
    Collect { replica: usize },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let replica = 0..REPLICAS;
    prop_oneof![
        (replica.clone(), 0usize..64, "[a-z \n]{1,4}")
            .prop_map(|(replica, pos, text)| Step::Insert { replica, pos, text }),
        (replica.clone(), 0usize..64, 1usize..4)
            .prop_map(|(replica, pos, len)| Step::Delete { replica, pos, len }),
        (replica.clone(), 0usize..64, 1usize..4, any::<bool>()).prop_map(
            |(replica, pos, len, bold)| Step::Format {
                replica,
                pos,
                len,
                bold
            }
        ),
        (replica.clone(), any::<usize>())
            .prop_map(|(replica, pick)| Step::Deliver { replica, pick }),
        replica.prop_map(|replica| Step::Collect { replica }),
    ]
}

/// Replicas plus, for each, the updates it has not received yet
struct Network {
    docs: Vec<Document>,
    inboxes: Vec<Vec<Update>>,
}

impl Network {
    fn new() -> Self {
        Self {
            docs: (1..=REPLICAS as u64).map(Document::new).collect(),
            inboxes: vec![Vec::new(); REPLICAS],
        }
    }

    fn local(&mut self, replica: usize, op: LocalOp) {
        let doc = &mut self.docs[replica];
        let clamp = |pos: usize, len: usize| if len == 0 { 0 } else { pos % (len + 1) };
        let op = match op {
            LocalOp::Insert { index, text, attrs } => LocalOp::Insert {
                index: clamp(index, doc.len()),
                text,
                attrs,
            },
            LocalOp::Delete { index, len } => LocalOp::Delete {
                index: clamp(index, doc.len()),
                len,
            },
            LocalOp::Format {
                index,
                len,
                key,
                value,
            } => LocalOp::Format {
                index: clamp(index, doc.len()),
                len,
                key,
                value,
            },
        };
        let update = doc.apply_local_op(op);
        if update.is_empty() {
            return;
        }
        // Every update travels through the binary codec
        let bytes = codec::encode(&update);
        for (other, inbox) in self.inboxes.iter_mut().enumerate() {
            if other != replica {
                inbox.push(codec::decode(&bytes).unwrap());
            }
        }
    }

    fn deliver(&mut self, replica: usize, pick: usize) {
        let inbox = &mut self.inboxes[replica];
        if inbox.is_empty() {
            return;
        }
        let update = inbox.remove(pick % inbox.len());
        self.docs[replica].apply_remote_update(&update);
    }

    fn collect(&mut self, replica: usize) {
        let offline = REPLICAS - 1;
        let peers: Vec<StateVector> = self
            .docs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != replica && *i != offline)
            .map(|(_, doc)| doc.state_vector())
            .collect();
        self.docs[replica].garbage_collect_tombstones(&peers);
    }

    fn run(&mut self, step: Step) {
        match step {
            Step::Insert { replica, pos, text } => self.local(replica, LocalOp::insert(pos, text)),
            Step::Delete { replica, pos, len } => self.local(replica, LocalOp::delete(pos, len)),
            Step::Format { replica, pos, len, bold } => {
                let value = bold.then(|| "true".to_string());
                self.local(replica, LocalOp::format(pos, len, "bold", value));
            }
            Step::Deliver { replica, pick } => self.deliver(replica, pick),
            Step::Collect { replica } => self.collect(replica),
        }
    }

    fn flush(&mut self) {
        // Newest first, to exercise causal buffering
        for replica in 0..REPLICAS {
            while let Some(update) = self.inboxes[replica].pop() {
                self.docs[replica].apply_remote_update(&update);
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn replicas_converge(steps in prop::collection::vec(step_strategy(), 1..60)) {
        let mut net = Network::new();
        for step in steps {
            net.run(step);
        }
        net.flush();

        let reference = &net.docs[0];
        prop_assert_eq!(reference.pending_len(), 0);
        for doc in &net.docs[1..] {
            prop_assert_eq!(doc.pending_len(), 0);
            prop_assert_eq!(doc.text(), reference.text());
            prop_assert_eq!(doc.spans(), reference.spans());
            prop_assert_eq!(doc.state_vector(), reference.state_vector());
        }
    }

    #[test]
    fn collection_without_offline_replica_converges(
        steps in prop::collection::vec(step_strategy(), 1..60),
    ) {
        let mut net = Network::new();
        for step in steps {
            net.run(step);
        }
        // Collect everywhere before the offline replica catches up
        for replica in 0..REPLICAS - 1 {
            net.collect(replica);
        }
        net.flush();
        for replica in 0..REPLICAS {
            net.collect(replica);
        }

        let reference = &net.docs[0];
        for doc in &net.docs[1..] {
            prop_assert_eq!(doc.text(), reference.text());
            prop_assert_eq!(doc.spans(), reference.spans());
        }
    }

    #[test]
    fn redelivery_is_idempotent(steps in prop::collection::vec(step_strategy(), 1..30)) {
        let mut net = Network::new();
        let mut all = Vec::new();
        for step in steps {
            if let Step::Insert { replica: 0, pos, text } = step {
                let len = net.docs[0].len();
                let pos = if len == 0 { 0 } else { pos % (len + 1) };
                all.push(net.docs[0].apply_local_op(LocalOp::insert(pos, text)));
            }
        }

        let mut replica = Document::new(9);
        for update in all.iter().chain(all.iter().rev()) {
            replica.apply_remote_update(update);
        }
        let merged = Update::merge(all.clone());
        let outcome = replica.apply_remote_update(&merged);
        prop_assert!(!outcome.changed);
        prop_assert_eq!(replica.text(), net.docs[0].text());
    }

    #[test]
    fn diff_brings_replica_up_to_date(
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let mut net = Network::new();
        for step in steps {
            match step {
                Step::Insert { replica, pos, text } => net.local(replica, LocalOp::insert(pos, text)),
                Step::Delete { replica, pos, len } => net.local(replica, LocalOp::delete(pos, len)),
                _ => {}
            }
        }
        net.flush();

        let mut fresh = Document::new(42);
        let diff = net.docs[1].compute_diff(&fresh.state_vector());
        fresh.apply_remote_update(&diff);
        prop_assert_eq!(fresh.text(), net.docs[1].text());

        // Nothing left to send afterwards
        prop_assert!(net.docs[1].compute_diff(&fresh.state_vector()).is_empty());
    }
}
