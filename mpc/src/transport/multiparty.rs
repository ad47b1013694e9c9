use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    FutureExt, Sink, SinkExt, Stream, StreamExt, TryFutureExt,
};

use super::{Transport, TransportError};
use crate::MpcContext;

/// Wrapper for peer-to-peer connections in multi-party protocol.
pub struct MultipartyTransport<T, Channel> {
    channels: Vec<Option<(SplitSink<Channel, T>, SplitStream<Channel>)>>,
    party_id: usize,
}

impl<T, Channel> MultipartyTransport<T, Channel>
where
    Channel: Stream + Sink<T>,
{
    /// Create wrapper for given list of connections. All channels but party_id should be present.
    pub fn new(channels: impl IntoIterator<Item = Option<Channel>>, party_id: usize) -> Self {
        // Unidirectional halves let us wait on sends and receives at the same time.
        let channels: Vec<_> = channels.into_iter().map(|x| x.map(|x| x.split())).collect();
        for (j, channel) in channels.iter().enumerate() {
            if j != party_id && channel.is_none() {
                panic!("Channel missing for party {}", j);
            }
        }
        Self { channels, party_id }
    }
}

impl<T, Channel> MultipartyTransport<T, Channel> {
    fn channel(
        &mut self,
        other_id: usize,
    ) -> Result<&mut (SplitSink<Channel, T>, SplitStream<Channel>), TransportError> {
        if other_id == self.party_id {
            return Err(TransportError::InvalidPeer(other_id));
        }
        self.channels
            .get_mut(other_id)
            .and_then(Option::as_mut)
            .ok_or(TransportError::InvalidPeer(other_id))
    }
}

impl<T, Channel> MpcContext for MultipartyTransport<T, Channel> {
    fn num_parties(&self) -> usize {
        self.channels.len()
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

#[async_trait(?Send)]
impl<T, E, Channel> Transport<T> for MultipartyTransport<T, Channel>
where
    T: Clone + 'static,
    Channel: Stream<Item = Result<T, E>> + Sink<T> + Unpin,
{
    async fn send_to(&mut self, other_id: usize, msg: T) -> Result<(), TransportError> {
        let (sink, _) = self.channel(other_id)?;
        sink.send(msg)
            .await
            .map_err(|_| TransportError::Send(other_id))
    }

    async fn receive_from(&mut self, other_id: usize) -> Result<T, TransportError> {
        let (_, stream) = self.channel(other_id)?;
        match stream.next().await {
            Some(Ok(msg)) => Ok(msg),
            _ => Err(TransportError::Recv(other_id)),
        }
    }

    async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>, TransportError> {
        let party_id = self.party_id;
        futures::future::try_join_all(
            self.channels
                .iter_mut()
                .enumerate()
                .filter(|(id, _)| *id != party_id)
                .filter_map(|(id, channel)| channel.as_mut().map(|channel| (id, channel)))
                .map(|(id, (sink, stream))| {
                    let send_future = sink
                        .send(msg.clone())
                        .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) });
                    let recv_future = stream.next().then(move |raw| async move {
                        match raw {
                            Some(Ok(msg)) => Ok((id, msg)),
                            _ => Err(TransportError::Recv(id)),
                        }
                    });
                    futures::future::try_join(send_future, recv_future)
                        .and_then(|(_, received_msg)| async { Ok(received_msg) })
                }),
        )
        .await
    }

    async fn exchange_with_each(
        &mut self,
        msgs: Vec<T>,
    ) -> Result<Vec<(usize, T)>, TransportError> {
        if msgs.len() != self.channels.len() {
            return Err(TransportError::MessageCount(msgs.len()));
        }
        let party_id = self.party_id;
        futures::future::try_join_all(
            self.channels
                .iter_mut()
                .zip(msgs)
                .enumerate()
                .filter(|(id, _)| *id != party_id)
                .filter_map(|(id, (channel, msg))| {
                    channel.as_mut().map(|channel| (id, channel, msg))
                })
                .map(|(id, (sink, stream), msg)| {
                    let send_future = sink
                        .send(msg)
                        .then(move |x| async move { x.map_err(|_| TransportError::Send(id)) });
                    let recv_future = stream.next().then(move |raw| async move {
                        match raw {
                            Some(Ok(msg)) => Ok((id, msg)),
                            _ => Err(TransportError::Recv(id)),
                        }
                    });
                    futures::future::try_join(send_future, recv_future)
                        .and_then(|(_, received_msg)| async { Ok(received_msg) })
                }),
        )
        .await
    }
}
