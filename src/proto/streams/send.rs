use std::collections::VecDeque;

use bytes::Bytes;
use http::HeaderMap;
use http::response;

use super::flow_control::FlowControl;
use super::scheduler::Scheduler;
use super::store::Store;
use super::stream::{State, Stream};
use super::Config;
use codec::UserError;
use error::Reason;
use frame::{self, StreamId};
use proto::{Outbox, WindowSize};

/// Egress state: the connection send window, the peer's stream-id
/// space for pushes, and the post-flush proceed queue.
#[derive(Debug)]
pub struct Send {
    /// Connection-level send window.
    window: FlowControl,

    /// The peer's SETTINGS_INITIAL_WINDOW_SIZE, applied to new streams.
    init_window: WindowSize,

    pub push_max_open: StreamId,

    /// Streams whose staged egress flushed and owe the application a
    /// `proceed_send` after the next write completion.
    streams_to_proceed: VecDeque<StreamId>,
}

impl Send {
    pub fn new(_config: &Config) -> Send {
        Send {
            window: FlowControl::new(::proto::DEFAULT_INITIAL_WINDOW_SIZE),
            init_window: ::proto::DEFAULT_INITIAL_WINDOW_SIZE,
            push_max_open: StreamId::ZERO,
            streams_to_proceed: VecDeque::new(),
        }
    }

    pub fn init_window(&self) -> WindowSize {
        self.init_window
    }

    pub fn conn_window(&self) -> i32 {
        self.window.window()
    }

    /// WINDOW_UPDATE on stream zero.
    pub fn recv_connection_window_update(&mut self, incr: WindowSize) -> Result<(), Reason> {
        self.window.inc_window(incr)
    }

    /// The peer changed SETTINGS_INITIAL_WINDOW_SIZE: the delta applies
    /// to the connection window and to every live stream's send
    /// window, and newly unblocked streams are reactivated.
    pub fn apply_initial_window_delta(
        &mut self,
        new_init: WindowSize,
        store: &mut Store,
        sched: &mut Scheduler,
    ) -> Result<(), Reason> {
        let delta = new_init as i64 - self.init_window as i64;
        self.init_window = new_init;

        if delta == 0 {
            return Ok(());
        }

        self.window.apply_delta(delta)?;

        let mut err = None;

        store.for_each(|mut stream| {
            if let Err(e) = stream.send_flow.apply_delta(delta) {
                err = Some(e);
                return;
            }

            if stream.send_flow.window() > 0 && stream.pending_send() > 0 {
                sched.activate(stream.scheduler_node);
            } else if stream.send_flow.window() <= 0 {
                sched.deactivate(stream.scheduler_node);
            }
        });

        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ===== response staging =====

    pub fn stage_response(
        &mut self,
        stream: &mut Stream,
        parts: response::Parts,
        end_of_stream: bool,
        out: &mut Outbox,
    ) -> Result<(), UserError> {
        if stream.state != State::ReqPending || !stream.dispatched {
            return Err(UserError::UnexpectedSendState);
        }

        trace!(
            "staging response; id={:?} status={} eos={}",
            stream.id,
            parts.status,
            end_of_stream
        );

        let mut frame = frame::Headers::response(stream.id, parts.status, parts.headers);

        stream.advance(State::SendHeaders);

        if end_of_stream {
            frame.set_end_stream();
            stream.send_final = true;
            stream.end_sent = true;
            stream.advance(State::SendBodyIsFinal);
        } else {
            stream.advance(State::SendBody);
        }

        out.frame(frame.into());
        Ok(())
    }

    pub fn stage_data(
        &mut self,
        stream: &mut Stream,
        data: Bytes,
        end_of_stream: bool,
        sched: &mut Scheduler,
    ) -> Result<(), UserError> {
        if stream.state != State::SendBody || stream.send_final {
            return Err(UserError::UnexpectedSendState);
        }

        stream.sendq.extend_from_slice(&data);

        if end_of_stream {
            stream.send_final = true;
            stream.advance(State::SendBodyIsFinal);
        }

        if stream.send_flow.window() > 0 || stream.pending_send() == 0 {
            sched.activate(stream.scheduler_node);
        }

        Ok(())
    }

    pub fn stage_trailers(
        &mut self,
        stream: &mut Stream,
        trailers: HeaderMap,
        sched: &mut Scheduler,
    ) -> Result<(), UserError> {
        if stream.state != State::SendBody || stream.send_final {
            return Err(UserError::UnexpectedSendState);
        }

        stream.pending_trailers = Some(trailers);
        stream.send_final = true;
        stream.advance(State::SendBodyIsFinal);
        sched.activate(stream.scheduler_node);

        Ok(())
    }

    // ===== the DATA production half of the write loop =====

    /// Ask the scheduler for senders and frame their pending bytes, up
    /// to the flow-control windows, the peer's max frame size, and the
    /// output budget. Returns the streams whose responses completed.
    pub fn produce(
        &mut self,
        store: &mut Store,
        sched: &mut Scheduler,
        out: &mut Outbox,
        budget: usize,
    ) -> Vec<StreamId> {
        let mut finished = Vec::new();

        while out.buf.len() < budget {
            if self.window.window() <= 0 && !self.only_zero_cost_senders(store, sched) {
                break;
            }

            let id = match sched.next_sender() {
                Some(id) => id,
                None => break,
            };

            let max_frame = out.max_frame_size();
            let conn_window = self.window.available() as usize;

            let mut stream = match store.find_mut(&id) {
                Some(stream) => stream,
                None => {
                    debug_assert!(false, "scheduler yielded a dead stream");
                    continue;
                }
            };

            let len = ::std::cmp::min(
                ::std::cmp::min(stream.pending_send(), stream.send_flow.available() as usize),
                ::std::cmp::min(conn_window, max_frame),
            );

            let drains = len == stream.pending_send();
            let is_final = stream.send_final;

            if len > 0 || (drains && is_final && stream.pending_trailers.is_none()) {
                let end_stream = drains && is_final && stream.pending_trailers.is_none();

                let payload = stream.sendq.split_to(len).freeze();
                let mut frame = frame::Data::new(id, payload);

                if end_stream {
                    frame.set_end_stream();
                    stream.end_sent = true;
                }

                stream.send_flow.dec_window(len as WindowSize);
                self.window.dec_window(len as WindowSize);
                out.frame(frame.into());
            }

            if stream.pending_send() > 0 {
                if stream.send_flow.window() <= 0 {
                    // Blocked on the stream window; WINDOW_UPDATE will
                    // reactivate it.
                    sched.deactivate(stream.scheduler_node);
                }
                // Blocked on the connection window or budget: leave the
                // node active and retry on the next flush.
                if self.window.window() <= 0 {
                    break;
                }
                continue;
            }

            // Queue drained.
            sched.deactivate(stream.scheduler_node);

            if is_final {
                if let Some(trailers) = stream.pending_trailers.take() {
                    let frame = frame::Headers::trailers(id, trailers);
                    stream.end_sent = true;
                    out.frame(frame.into());
                }

                finished.push(id);
            } else {
                // The application owes more body; invite it after this
                // buffer flushes.
                if !self.streams_to_proceed.contains(&id) {
                    self.streams_to_proceed.push_back(id);
                }
            }
        }

        finished
    }

    /// True when some active sender can still make progress with a zero
    /// connection window (final empty frames, trailers).
    fn only_zero_cost_senders(&self, store: &mut Store, sched: &Scheduler) -> bool {
        let mut any = false;

        store.for_each(|stream| {
            if sched.is_active(stream.scheduler_node)
                && stream.send_final
                && stream.pending_send() == 0
            {
                any = true;
            }
        });

        any
    }

    // ===== proceed queue =====

    pub fn take_proceeds(&mut self) -> Vec<StreamId> {
        self.streams_to_proceed.drain(..).collect()
    }

    pub fn has_proceeds(&self) -> bool {
        !self.streams_to_proceed.is_empty()
    }

    pub fn unqueue(&mut self, id: StreamId) {
        self.streams_to_proceed.retain(|&p| p != id);
    }
}
