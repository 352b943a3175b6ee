//! Bindings for the two deployed contracts.
//!
//! Both handles are bound to the session account: views are executed with
//! `from = account` (the chat contract reads `msg.sender` in `getFriends`,
//! the token contract in `getCooldownRemaining`) and writes are signed by it.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall};

use chatchain_shared::types::{Message, UserProfile};
use chatchain_shared::units::TokenAmount;

use crate::error::{ChainError, ProviderError};
use crate::provider::WalletProvider;
use crate::rpc::Rpc;

sol! {
    struct ChatUser {
        string name;
        address userAddress;
        bool exists;
    }

    struct ChatMessage {
        address sender;
        address receiver;
        string content;
        uint256 timestamp;
    }

    interface IChatContract {
        function isRegistered(address user) external view returns (bool);
        function getUserByAddress(address user) external view returns (ChatUser memory);
        function getAllUsers() external view returns (ChatUser[] memory);
        function registerUser(string name) external;
        function addFriend(address friend) external;
        function getFriends() external view returns (ChatUser[] memory);
        function checkFriendship(address a, address b) external view returns (bool);
        function sendMessage(address to, string content) external;
        function getMessages(address peer) external view returns (ChatMessage[] memory);
        function sendTokensToFriend(address to, uint256 amount) external;

        event MessageSent(address indexed from, address indexed to);
        event FriendAdded(address indexed user, address indexed friend);
    }

    interface IChatToken {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function requestTokens() external;
        function getCooldownRemaining() external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
        event TokensRequested(address indexed user, uint256 amount);
    }
}

impl From<ChatUser> for UserProfile {
    fn from(u: ChatUser) -> Self {
        UserProfile {
            name: u.name,
            address: u.userAddress,
            exists: u.exists,
        }
    }
}

impl From<ChatMessage> for Message {
    fn from(m: ChatMessage) -> Self {
        Message {
            sender: m.sender,
            receiver: m.receiver,
            content: m.content,
            timestamp_secs: u64::try_from(m.timestamp).unwrap_or(u64::MAX),
        }
    }
}

/// A contract address bound to an account and a provider.
struct Binding<P> {
    address: Address,
    account: Address,
    rpc: Rpc<P>,
}

impl<P> Clone for Binding<P> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            account: self.account,
            rpc: self.rpc.clone(),
        }
    }
}

impl<P: WalletProvider> Binding<P> {
    async fn view<C: SolCall>(&self, call: C) -> Result<C::Return, ChainError> {
        let data = call.abi_encode();
        let out = self.rpc.call(Some(self.account), self.address, &data).await?;
        Ok(C::abi_decode_returns(&out)?)
    }

    async fn submit<C: SolCall>(&self, call: C) -> Result<B256, ProviderError> {
        let data = call.abi_encode();
        self.rpc.send_transaction(self.account, self.address, &data).await
    }
}

/// Handle to the chat / user-registry contract.
pub struct ChatContract<P> {
    inner: Binding<P>,
}

impl<P> Clone for ChatContract<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: WalletProvider> ChatContract<P> {
    pub fn new(rpc: Rpc<P>, address: Address, account: Address) -> Self {
        Self {
            inner: Binding {
                address,
                account,
                rpc,
            },
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn account(&self) -> Address {
        self.inner.account
    }

    pub async fn is_registered(&self, user: Address) -> Result<bool, ChainError> {
        self.inner.view(IChatContract::isRegisteredCall { user }).await
    }

    pub async fn get_user_by_address(&self, user: Address) -> Result<UserProfile, ChainError> {
        let raw = self.inner.view(IChatContract::getUserByAddressCall { user }).await?;
        Ok(raw.into())
    }

    pub async fn get_all_users(&self) -> Result<Vec<UserProfile>, ChainError> {
        let raw = self.inner.view(IChatContract::getAllUsersCall {}).await?;
        Ok(raw.into_iter().map(UserProfile::from).collect())
    }

    pub async fn get_friends(&self) -> Result<Vec<UserProfile>, ChainError> {
        let raw = self.inner.view(IChatContract::getFriendsCall {}).await?;
        Ok(raw.into_iter().map(UserProfile::from).collect())
    }

    pub async fn check_friendship(&self, a: Address, b: Address) -> Result<bool, ChainError> {
        self.inner.view(IChatContract::checkFriendshipCall { a, b }).await
    }

    pub async fn get_messages(&self, peer: Address) -> Result<Vec<Message>, ChainError> {
        let raw = self.inner.view(IChatContract::getMessagesCall { peer }).await?;
        Ok(raw.into_iter().map(Message::from).collect())
    }

    pub async fn register_user(&self, name: &str) -> Result<B256, ProviderError> {
        self.inner
            .submit(IChatContract::registerUserCall {
                name: name.to_string(),
            })
            .await
    }

    pub async fn add_friend(&self, friend: Address) -> Result<B256, ProviderError> {
        self.inner.submit(IChatContract::addFriendCall { friend }).await
    }

    pub async fn send_message(&self, to: Address, content: &str) -> Result<B256, ProviderError> {
        self.inner
            .submit(IChatContract::sendMessageCall {
                to,
                content: content.to_string(),
            })
            .await
    }

    pub async fn send_tokens_to_friend(
        &self,
        to: Address,
        amount: TokenAmount,
    ) -> Result<B256, ProviderError> {
        self.inner
            .submit(IChatContract::sendTokensToFriendCall {
                to,
                amount: amount.base_units(),
            })
            .await
    }
}

/// Handle to the CHAT token contract.
pub struct TokenContract<P> {
    inner: Binding<P>,
}

impl<P> Clone for TokenContract<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: WalletProvider> TokenContract<P> {
    pub fn new(rpc: Rpc<P>, address: Address, account: Address) -> Self {
        Self {
            inner: Binding {
                address,
                account,
                rpc,
            },
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub async fn balance_of(&self, account: Address) -> Result<TokenAmount, ChainError> {
        let raw: U256 = self.inner.view(IChatToken::balanceOfCall { account }).await?;
        Ok(TokenAmount::from_base_units(raw))
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount, ChainError> {
        let raw: U256 = self
            .inner
            .view(IChatToken::allowanceCall { owner, spender })
            .await?;
        Ok(TokenAmount::from_base_units(raw))
    }

    /// Cooldown of the bound account, in seconds.
    pub async fn cooldown_remaining(&self) -> Result<u64, ChainError> {
        let raw: U256 = self.inner.view(IChatToken::getCooldownRemainingCall {}).await?;
        Ok(u64::try_from(raw).unwrap_or(u64::MAX))
    }

    /// Cooldown of an arbitrary account (the view reads `msg.sender`).
    pub async fn cooldown_remaining_of(&self, account: Address) -> Result<u64, ChainError> {
        let data = IChatToken::getCooldownRemainingCall {}.abi_encode();
        let out = self
            .inner
            .rpc
            .call(Some(account), self.inner.address, &data)
            .await?;
        let raw = IChatToken::getCooldownRemainingCall::abi_decode_returns(&out)?;
        Ok(u64::try_from(raw).unwrap_or(u64::MAX))
    }

    pub async fn approve(&self, spender: Address, amount: TokenAmount) -> Result<B256, ProviderError> {
        self.inner
            .submit(IChatToken::approveCall {
                spender,
                amount: amount.base_units(),
            })
            .await
    }

    pub async fn request_tokens(&self) -> Result<B256, ProviderError> {
        self.inner.submit(IChatToken::requestTokensCall {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;

    #[test]
    fn test_selectors_match_abi() {
        // balanceOf(address) / approve(address,uint256) are ERC-20 standard
        assert_eq!(IChatToken::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(IChatToken::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(
            IChatToken::Transfer::SIGNATURE,
            "Transfer(address,address,uint256)"
        );
    }

    #[test]
    fn test_message_conversion() {
        let raw = ChatMessage {
            sender: Address::repeat_byte(1),
            receiver: Address::repeat_byte(2),
            content: "hi".into(),
            timestamp: U256::from(42u64),
        };
        let m: Message = raw.into();
        assert_eq!(m.timestamp_secs, 42);
        assert_eq!(m.content, "hi");
    }
}
