use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cabot_link_proto::{Arbiter, Link, Message};
use cabot_link_transport::ManagerState;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::version::{check_version, VersionCheck};

/// What an adapter reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Only sent when the value flips.
    ConnectionChanged { link: Link, connected: bool },
    VersionChecked { link: Link, check: VersionCheck },
    /// A message that passed the arbiter.
    Message { link: Link, message: Message },
    BluetoothState(ManagerState),
}

/// The inbound half shared by both adapters: version check or arbitration,
/// then forward to the owner.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    link: Link,
    arbiter: Arc<Arbiter>,
    tx: mpsc::UnboundedSender<PeerEvent>,
    local_version: String,
    connected: Arc<AtomicBool>,
}

impl EventSink {
    pub(crate) fn new(
        link: Link,
        arbiter: Arc<Arbiter>,
        tx: mpsc::UnboundedSender<PeerEvent>,
        local_version: String,
    ) -> Self {
        Self {
            link,
            arbiter,
            tx,
            local_version,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn link(&self) -> Link {
        self.link
    }

    pub(crate) fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub(crate) fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub(crate) fn emit(&self, event: PeerEvent) {
        if self.tx.send(event).is_err() {
            debug!(link = %self.link, "event receiver dropped");
        }
    }

    /// Record the connection state; reports only transitions.
    pub(crate) fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::SeqCst) != connected {
            info!(link = %self.link, connected, "connection state changed");
            self.emit(PeerEvent::ConnectionChanged {
                link: self.link,
                connected,
            });
        }
    }

    pub(crate) fn deliver(&self, message: Message) {
        if let Message::Version(remote) = &message {
            match check_version(&self.local_version, remote) {
                Ok(check) => self.emit(PeerEvent::VersionChecked {
                    link: self.link,
                    check,
                }),
                Err(err) => warn!(link = %self.link, error = %err, "version announcement dropped"),
            }
            return;
        }

        // Forwarded under the arbiter lock so ids stay ordered across links.
        let kind = message.kind();
        let verdict = self.arbiter.admit_then(message, self.link, |message| {
            self.emit(PeerEvent::Message {
                link: self.link,
                message,
            })
        });
        if !verdict.is_accepted() {
            debug!(link = %self.link, %kind, ?verdict, "message not forwarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use cabot_link_proto::{DeviceStatus, NavigationEvent, NavigationEventRequest};

    use super::*;

    fn sink(link: Link, arbiter: Arc<Arbiter>) -> (EventSink, mpsc::UnboundedReceiver<PeerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(link, arbiter, tx, "20230222".to_string()), rx)
    }

    #[test]
    fn transitions_only() {
        let (sink, mut rx) = sink(Link::Tcp, Arc::new(Arbiter::new()));
        sink.set_connected(false);
        sink.set_connected(true);
        sink.set_connected(true);
        sink.set_connected(false);

        assert_eq!(
            rx.try_recv().unwrap(),
            PeerEvent::ConnectionChanged {
                link: Link::Tcp,
                connected: true
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PeerEvent::ConnectionChanged {
                link: Link::Tcp,
                connected: false
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn version_goes_to_check_not_arbiter() {
        let (sink, mut rx) = sink(Link::Ble, Arc::new(Arbiter::new()));
        sink.deliver(Message::Version("20230101".to_string()));
        match rx.try_recv().unwrap() {
            PeerEvent::VersionChecked { link, check } => {
                assert_eq!(link, Link::Ble);
                assert!(!check.matched);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shared_arbiter_drops_second_copy() {
        let arbiter = Arc::new(Arbiter::new());
        let (ble, mut ble_rx) = sink(Link::Ble, Arc::clone(&arbiter));
        let (tcp, mut tcp_rx) = sink(Link::Tcp, arbiter);
        let msg = Message::Navigation(NavigationEventRequest {
            request_id: 11,
            event: NavigationEvent::Next,
            param: String::new(),
        });

        tcp.deliver(msg.clone());
        ble.deliver(msg);
        ble.deliver(Message::DeviceStatus(DeviceStatus::default()));

        assert!(matches!(
            tcp_rx.try_recv().unwrap(),
            PeerEvent::Message { link: Link::Tcp, .. }
        ));
        assert!(matches!(
            ble_rx.try_recv().unwrap(),
            PeerEvent::Message {
                message: Message::DeviceStatus(_),
                ..
            }
        ));
        assert!(ble_rx.try_recv().is_err());
    }

    #[test]
    fn concurrent_links_forward_ids_in_order() {
        let arbiter = Arc::new(Arbiter::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let workers: Vec<_> = [Link::Ble, Link::Tcp]
            .into_iter()
            .map(|link| {
                let sink = EventSink::new(link, Arc::clone(&arbiter), tx.clone(), String::new());
                std::thread::spawn(move || {
                    for id in 1..=20_000 {
                        sink.deliver(Message::Navigation(NavigationEventRequest {
                            request_id: id,
                            event: NavigationEvent::Next,
                            param: String::new(),
                        }));
                    }
                })
            })
            .collect();
        drop(tx);
        for worker in workers {
            worker.join().unwrap();
        }

        let mut last = 0;
        let mut forwarded = 0;
        while let Ok(event) = rx.try_recv() {
            let request = match event {
                PeerEvent::Message {
                    message: Message::Navigation(request),
                    ..
                } => request,
                other => panic!("unexpected {other:?}"),
            };
            assert!(request.request_id > last, "{} after {last}", request.request_id);
            last = request.request_id;
            forwarded += 1;
        }
        assert_eq!(last, 20_000);
        assert!(forwarded <= 20_000);
    }
}
