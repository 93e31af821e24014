pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use bbox::XYXY;
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::Itertools as _;
pub use log::{debug, info, warn};
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    cmp::Ordering,
    collections::{HashMap, HashSet},
    fmt,
    fmt::Debug,
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write as _},
    iter,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

unzip_n::unzip_n!(pub 11);
