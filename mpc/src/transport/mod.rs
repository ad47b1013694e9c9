mod multiparty;
pub mod networking;

pub use multiparty::*;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;

use crate::MpcContext;

/// Error type for channels.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Error while sending message to {0}")]
    Send(usize),
    #[error("Error while receiving message from {0}")]
    Recv(usize),
    #[error("Party {0} is not a peer of this party")]
    InvalidPeer(usize),
    #[error("Expected one message per party, got {0}")]
    MessageCount(usize),
}

/// Reliable, ordered point-to-point channels between all computing parties.
#[async_trait(?Send)]
pub trait Transport<T: 'static>: MpcContext {
    /// Send message to party with given ID.
    async fn send_to(&mut self, other_id: usize, msg: T) -> Result<(), TransportError>;

    /// Receive message from party with given ID. Blocks until the message arrives.
    async fn receive_from(&mut self, other_id: usize) -> Result<T, TransportError>;

    /// Send message to all parties and receive one message from each of them.
    async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>, TransportError>;

    /// Send `msgs[j]` to every party `j` and receive one message from each of them.
    /// The entry at this party's own index is dropped.
    async fn exchange_with_each(
        &mut self,
        msgs: Vec<T>,
    ) -> Result<Vec<(usize, T)>, TransportError>;
}

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// Length-framed Bincode-encoded tokio's Duplex stream.
pub type BincodeDuplex<T> = BincodeStreamSink<T, DuplexStream>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_channel_with_bincode<T, C>(channel: C) -> BincodeStreamSink<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let length_delimited = tokio_util::codec::Framed::new(channel, LengthDelimitedCodec::new());
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create bidirectional Bincode-encoded channel.
pub fn bincode_duplex<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_channel_with_bincode(a), wrap_channel_with_bincode(b))
}

/// Create in-process channels for testing multiparty protocols.
pub fn mock_multiparty_channels<T>(
    num_parties: usize,
    max_buf_size: usize,
) -> Vec<MultipartyTransport<T, BincodeDuplex<T>>>
where
    T: Clone + Serialize + DeserializeOwned + Unpin,
{
    let mut matrix: Vec<Vec<_>> = (0..num_parties)
        .map(|_| (0..num_parties).map(|_| None).collect())
        .collect();

    for i in 0..num_parties {
        for j in 0..i {
            let (a, b) = bincode_duplex::<T>(max_buf_size);
            matrix[i][j] = Some(a);
            matrix[j][i] = Some(b);
        }
    }

    matrix
        .into_iter()
        .enumerate()
        .map(|(id, row)| MultipartyTransport::new(row, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exchange_with_all() {
        let transports = mock_multiparty_channels::<u64>(3, 1024);
        let results = futures::future::join_all(transports.into_iter().map(|mut t| async move {
            let id = t.party_id() as u64;
            t.exchange_with_all(id * 10).await.unwrap()
        }))
        .await;
        assert_eq!(results[0], vec![(1, 10), (2, 20)]);
        assert_eq!(results[1], vec![(0, 0), (2, 20)]);
        assert_eq!(results[2], vec![(0, 0), (1, 10)]);
    }

    #[tokio::test]
    async fn test_exchange_with_each() {
        let transports = mock_multiparty_channels::<Vec<u64>>(3, 64);
        let results = futures::future::join_all(transports.into_iter().map(|mut t| async move {
            let id = t.party_id() as u64;
            // Larger than the channel buffer in both directions.
            let msgs = (0..3).map(|to| vec![id * 10 + to; 32]).collect();
            t.exchange_with_each(msgs).await.unwrap()
        }))
        .await;
        assert_eq!(results[0], vec![(1, vec![10; 32]), (2, vec![20; 32])]);
        assert_eq!(results[1], vec![(0, vec![1; 32]), (2, vec![21; 32])]);
        assert_eq!(results[2], vec![(0, vec![2; 32]), (1, vec![12; 32])]);

        let mut transport = mock_multiparty_channels::<u64>(3, 64).remove(0);
        assert_eq!(
            transport.exchange_with_each(vec![1, 2]).await,
            Err(TransportError::MessageCount(2))
        );
    }

    #[tokio::test]
    async fn test_point_to_point() {
        let mut transports = mock_multiparty_channels::<String>(2, 1024);
        let mut second = transports.pop().unwrap();
        let mut first = transports.pop().unwrap();
        let (sent, received) = futures::join!(
            first.send_to(1, "hello".to_string()),
            second.receive_from(0)
        );
        assert_eq!(sent, Ok(()));
        assert_eq!(received, Ok("hello".to_string()));
        assert_eq!(
            first.send_to(0, String::new()).await,
            Err(TransportError::InvalidPeer(0))
        );
    }

    #[tokio::test]
    async fn test_closed_peer_is_reported() {
        let mut transports = mock_multiparty_channels::<u64>(2, 1024);
        let second = transports.pop().unwrap();
        let mut first = transports.pop().unwrap();
        drop(second);
        assert_eq!(first.receive_from(1).await, Err(TransportError::Recv(1)));
    }
}
