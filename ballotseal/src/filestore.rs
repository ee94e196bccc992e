//! Filesystem [`Store`] backend.
//!
//! Two files per poll under a configured directory: `<id>_key` holds the
//! 32-byte private poll key, `<id>_hash` the committed result signature.
//! Slashes in the id are mapped to underscores. Both files are written
//! with exclusive create and mode 0400, so the filesystem itself enforces
//! the save-once semantics even across process restarts.
//!
//! With a single service process this is concurrency safe; with several
//! processes on one directory it depends on the filesystem's exclusive
//! create.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use subtle::ConstantTimeEq;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::store::Store;

pub struct FileStore {
    mu: Mutex<()>,
    path: PathBuf,
}

impl FileStore {
    /// A store rooted at `path`. The directory is created lazily on the
    /// first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore {
            mu: Mutex::new(()),
            path: path.into(),
        }
    }

    fn key_file(&self, id: &str) -> PathBuf {
        self.path.join(format!("{}_key", id.replace('/', "_")))
    }

    fn hash_file(&self, id: &str) -> PathBuf {
        self.path.join(format!("{}_hash", id.replace('/', "_")))
    }
}

/// Open `path` for writing, failing if it already exists. Mode 0400: the
/// content is written once and never modified in place.
fn create_exclusive(path: &Path) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o400);
    }
    options.open(path)
}

impl Store for FileStore {
    fn save_key(&self, id: &str, key: &[u8], token: &CancelToken) -> Result<(), Error> {
        let _guard = self.mu.lock().unwrap();
        token.check()?;

        fs::create_dir_all(&self.path)
            .map_err(|err| Error::io("creating data directory", err))?;

        let mut file = match create_exclusive(&self.key_file(id)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Err(Error::Exist),
            Err(err) => return Err(Error::io("creating key file", err)),
        };

        file.write_all(key)
            .map_err(|err| Error::io("writing key file", err))?;
        Ok(())
    }

    fn load_key(&self, id: &str, token: &CancelToken) -> Result<Vec<u8>, Error> {
        let _guard = self.mu.lock().unwrap();
        token.check()?;

        match fs::read(self.key_file(id)) {
            Ok(key) => Ok(key),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(Error::NotExist),
            Err(err) => Err(Error::io("reading key file", err)),
        }
    }

    fn validate_signature(
        &self,
        id: &str,
        signature: &[u8],
        token: &CancelToken,
    ) -> Result<(), Error> {
        let _guard = self.mu.lock().unwrap();
        token.check()?;

        if let Err(err) = fs::metadata(self.key_file(id)) {
            if err.kind() == io::ErrorKind::NotFound {
                return Err(Error::NotExist);
            }
            return Err(Error::io("checking key file", err));
        }

        let mut file = match create_exclusive(&self.hash_file(id)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let committed = fs::read(self.hash_file(id))
                    .map_err(|err| Error::io("reading hash file", err))?;
                if committed.as_slice().ct_eq(signature).unwrap_u8() == 1 {
                    return Ok(());
                }
                return Err(Error::invalid("signature differs from the committed value"));
            }
            Err(err) => return Err(Error::io("creating hash file", err)),
        };

        file.write_all(signature)
            .map_err(|err| Error::io("writing hash file", err))?;
        Ok(())
    }

    fn clear_poll(&self, id: &str, token: &CancelToken) -> Result<(), Error> {
        let _guard = self.mu.lock().unwrap();
        token.check()?;

        for path in [self.key_file(id), self.hash_file(id)] {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    return Err(Error::io("deleting poll file", err));
                }
            }
        }
        Ok(())
    }
}
