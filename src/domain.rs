mod email_address;
mod list;
mod member;
mod merge_vars;
mod status;
mod user;

pub use email_address::EmailAddress;
pub use list::{ListId, ListInfo, ListMap};
pub use member::{Geo, MemberInfo, MemberReceipt, MemberStatus};
pub use merge_vars::{Grouping, MergeValue, MergeVars, EMAIL, GROUPINGS};
pub use status::{GeoPoint, ListMemberInfo, RemoteInfo, SubscriberStatus, SyncAction};
pub use user::{User, UserId, UserRef};
