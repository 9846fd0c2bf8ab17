//! Scripted federates.
//!
//! A simulated federate owns a fixed, increasing list of event tags. It
//! reports the earliest as its next event, processes every tag it is granted,
//! reports completion, and leaves once the list is empty or cut short by an
//! agreed stop.

use rti_messages::Message;
use rti_types::{FederateId, Tag};
use std::collections::VecDeque;
use tracing::trace;

/// How a federate leaves when it runs out of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Sends RESIGN, then closes the socket.
    Resign,
    /// Drops the socket without a word.
    Disconnect,
}

/// What a simulated federate will do.
#[derive(Debug, Clone)]
pub struct FederateScript {
    /// Event tags, strictly increasing.
    pub tags: Vec<Tag>,
    pub ending: Ending,
    /// Request a stop after completing this many tags.
    pub stop_after: Option<usize>,
}

/// Something the federate does in response to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederateOutput {
    Send(Message),
    /// Close the connection.
    Disconnect,
}

#[derive(Debug)]
pub struct SimulatedFederate {
    id: FederateId,
    pending: VecDeque<Tag>,
    ending: Ending,
    stop_after: Option<usize>,
    processed: usize,
    completed: Tag,
    last_grant: Tag,
    stop: Option<Tag>,
    start_time: Option<i64>,
    joined: bool,
    done: bool,
}

impl SimulatedFederate {
    pub fn new(id: FederateId, script: FederateScript) -> Self {
        Self {
            id,
            pending: script.tags.into(),
            ending: script.ending,
            stop_after: script.stop_after,
            processed: 0,
            completed: Tag::NEVER,
            last_grant: Tag::NEVER,
            stop: None,
            start_time: None,
            joined: false,
            done: false,
        }
    }

    pub fn id(&self) -> FederateId {
        self.id
    }

    /// Left the federation, by resigning or disconnecting.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn completed(&self) -> Tag {
        self.completed
    }

    pub fn last_grant(&self) -> Tag {
        self.last_grant
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    /// The join request to send when the federate starts.
    pub fn join(&self, federation_id: &str) -> Message {
        Message::Join {
            federate: self.id,
            federation_id: federation_id.to_string(),
        }
    }

    /// React to a message from the RTI. `now_ns` is the local clock.
    pub fn on_message(&mut self, message: Message, now_ns: i64) -> Vec<FederateOutput> {
        if self.done {
            return vec![];
        }
        trace!(federate = %self.id, message = message.type_name(), "Federate received");
        match message {
            Message::Ack { .. } => {
                self.joined = true;
                let mut outputs = vec![FederateOutput::Send(Message::Timestamp(now_ns))];
                match self.pending.front() {
                    Some(next) => outputs.push(FederateOutput::Send(Message::NextEventTag(*next))),
                    None => outputs.extend(self.finish()),
                }
                outputs
            }
            Message::Timestamp(start) => {
                self.start_time = Some(start);
                vec![]
            }
            Message::TimeAdvanceGrant(tag) => self.on_grant(tag),
            Message::StopRequest(time) => {
                let proposal = self
                    .pending
                    .front()
                    .map_or(self.completed.time, |next| next.time)
                    .max(time);
                vec![FederateOutput::Send(Message::StopRequestReply(proposal))]
            }
            Message::StopGranted(time) => {
                let stop = Tag::at(time);
                self.stop = Some(stop);
                self.pending.retain(|tag| *tag <= stop);
                if self.pending.is_empty() {
                    self.finish()
                } else {
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    fn on_grant(&mut self, grant: Tag) -> Vec<FederateOutput> {
        self.last_grant = grant;
        let mut outputs = Vec::new();
        let mut advanced = false;
        while let Some(next) = self.pending.front().copied() {
            if next > grant {
                break;
            }
            self.pending.pop_front();
            self.completed = next;
            self.processed += 1;
            advanced = true;
            outputs.push(FederateOutput::Send(Message::LogicalTagComplete(next)));

            if self.stop.is_none() && self.stop_after == Some(self.processed) {
                outputs.push(FederateOutput::Send(Message::StopRequest(next.time + 1)));
            }
        }

        match self.pending.front() {
            Some(next) if advanced => outputs.push(FederateOutput::Send(Message::NextEventTag(*next))),
            Some(_) => {}
            None => outputs.extend(self.finish()),
        }
        outputs
    }

    fn finish(&mut self) -> Vec<FederateOutput> {
        if self.done {
            return vec![];
        }
        self.done = true;
        match self.ending {
            Ending::Resign => vec![
                FederateOutput::Send(Message::Resign),
                FederateOutput::Disconnect,
            ],
            Ending::Disconnect => vec![FederateOutput::Disconnect],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(tags: &[(i64, u32)]) -> FederateScript {
        FederateScript {
            tags: tags.iter().map(|(t, m)| Tag::new(*t, *m)).collect(),
            ending: Ending::Resign,
            stop_after: None,
        }
    }

    fn sent(outputs: &[FederateOutput]) -> Vec<Message> {
        outputs
            .iter()
            .filter_map(|o| match o {
                FederateOutput::Send(message) => Some(message.clone()),
                FederateOutput::Disconnect => None,
            })
            .collect()
    }

    #[test]
    fn test_grant_processes_tags_and_reports_next() {
        let mut fed = SimulatedFederate::new(FederateId(0), script(&[(10, 0), (20, 0), (30, 0)]));
        let outputs = fed.on_message(Message::Ack { udp_port: None }, 0);
        assert_eq!(
            sent(&outputs),
            vec![
                Message::Timestamp(0),
                Message::NextEventTag(Tag::new(10, 0))
            ]
        );

        let outputs = fed.on_message(Message::TimeAdvanceGrant(Tag::new(25, 0)), 0);
        assert_eq!(
            sent(&outputs),
            vec![
                Message::LogicalTagComplete(Tag::new(10, 0)),
                Message::LogicalTagComplete(Tag::new(20, 0)),
                Message::NextEventTag(Tag::new(30, 0)),
            ]
        );
        assert_eq!(fed.completed(), Tag::new(20, 0));
    }

    #[test]
    fn test_partial_grant_sends_nothing() {
        let mut fed = SimulatedFederate::new(FederateId(0), script(&[(10, 0)]));
        fed.on_message(Message::Ack { udp_port: None }, 0);
        assert!(fed
            .on_message(Message::TimeAdvanceGrant(Tag::new(5, 0)), 0)
            .is_empty());
    }

    #[test]
    fn test_last_tag_resigns() {
        let mut fed = SimulatedFederate::new(FederateId(0), script(&[(10, 0)]));
        fed.on_message(Message::Ack { udp_port: None }, 0);
        let outputs = fed.on_message(Message::TimeAdvanceGrant(Tag::new(10, 0)), 0);
        assert_eq!(outputs.last(), Some(&FederateOutput::Disconnect));
        assert!(sent(&outputs).contains(&Message::Resign));
        assert!(fed.is_done());
    }

    #[test]
    fn test_stop_grant_truncates_pending() {
        let mut fed = SimulatedFederate::new(FederateId(0), script(&[(10, 0), (50, 0)]));
        fed.on_message(Message::Ack { udp_port: None }, 0);
        assert!(fed.on_message(Message::StopGranted(40), 0).is_empty());
        assert_eq!(fed.pending(), 1);

        let outputs = fed.on_message(Message::TimeAdvanceGrant(Tag::new(10, 0)), 0);
        assert!(fed.is_done());
        assert_eq!(outputs.last(), Some(&FederateOutput::Disconnect));
    }

    #[test]
    fn test_stop_reply_is_at_least_the_request() {
        let mut fed = SimulatedFederate::new(FederateId(1), script(&[(10, 0)]));
        let outputs = fed.on_message(Message::StopRequest(30), 0);
        assert_eq!(sent(&outputs), vec![Message::StopRequestReply(30)]);
    }
}
