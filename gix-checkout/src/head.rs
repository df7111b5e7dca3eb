//! The HEAD Updater: the last step of a checkout, run after a
//! successful apply (or immediately, when `noCheckout` skips the walk entirely).
use gix_hash::ObjectId;

use crate::collaborators::Collaborators;
use crate::{Error, Options};

/// Writes `HEAD` to point at `fullref` if it is a branch ref, or detaches it to `oid`
/// otherwise. The remote-tracking bootstrap runs earlier, inside
/// ref resolution, since it must happen before the walk reads the tree.
pub fn update<C: Collaborators>(
    options: &Options,
    fullref: &str,
    oid: &ObjectId,
    collaborators: &mut C,
) -> Result<(), Error> {
    if fullref.starts_with("refs/heads/") {
        collaborators
            .refs()
            .write_head_symbolic(&options.gitdir, fullref)
            .map_err(Error::from_collaborator)
    } else {
        collaborators
            .refs()
            .write_head_detached(&options.gitdir, oid)
            .map_err(Error::from_collaborator)
    }
}
