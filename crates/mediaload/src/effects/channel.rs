use crate::data::{Endpoint, ReadRequest, RequestId};

/// Request/response channel to the remote storage service.
///
/// Issuing never blocks. The owner of the channel hands each completion back
/// through [`Downloader::on_chunk`](crate::Downloader::on_chunk) on the
/// control path, in whatever order the responses arrive.
pub trait RemoteReadChannel {
    /// Send `request` to `endpoint` and return the id its completion will
    /// carry.
    fn issue(&mut self, endpoint: &Endpoint, request: &ReadRequest) -> RequestId;

    /// Drop interest in `id`. A completion that still arrives for it is
    /// ignored by the downloader.
    fn cancel(&mut self, id: RequestId);
}
